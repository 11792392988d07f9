/// Declare a newtype wrapper around a primitive id.
///
/// The generated type is `Copy`, ordered, hashable, serde-transparent and
/// converts to and from its inner type. Doc attributes are forwarded.
#[macro_export]
macro_rules! strong_type {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            #[inline]
            pub const fn new(val: $inner) -> Self {
                Self(val)
            }

            #[inline]
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $inner;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(val: $inner) -> Self {
                Self(val)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(val: $name) -> Self {
                val.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    strong_type!(
        /// Test id.
        Probe,
        i64
    );

    #[test]
    fn test_accessors() {
        let p = Probe::new(-7);
        assert_eq!(p.get(), -7);
        assert_eq!(*p, -7);
        let raw: i64 = p.into();
        assert_eq!(raw, -7);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format!("{:?}", Probe(3)), "Probe(3)");
        assert_eq!(format!("{}", Probe(3)), "3");
    }
}

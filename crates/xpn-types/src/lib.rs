#[allow(non_snake_case)]
pub mod status_code;

pub mod errno;
pub mod result;
pub mod status;

#[macro_use]
pub mod strong_type;

pub mod ids;

pub use errno::Errno;
pub use ids::*;
pub use result::Result;
pub use status::Status;
pub use status_code::*;

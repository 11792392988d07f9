strong_type!(
    /// Logical identity of the requesting client on a connection.
    ClientRank,
    i32
);
strong_type!(
    /// Per-request routing tag echoed on every reply.
    ClientTag,
    i32
);
strong_type!(
    /// Backing-store file descriptor handed to session-mode clients.
    FileHandle,
    i64
);
strong_type!(
    /// Backing-store directory handle handed to session-mode clients.
    DirHandle,
    i64
);
strong_type!(ConnectionId, u64);

impl FileHandle {
    /// Placeholder carried by stateless requests.
    pub const INVALID: FileHandle = FileHandle(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl DirHandle {
    pub const INVALID: DirHandle = DirHandle(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

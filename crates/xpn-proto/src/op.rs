use std::fmt;

use crate::codec::WireError;

/// Operation codes carried in the request envelope.
///
/// Numeric values are part of the wire protocol and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpCode {
    OpenFile = 0,
    CreatFile = 1,
    ReadFile = 2,
    WriteFile = 3,
    CloseFile = 4,
    RmFile = 5,
    RmFileAsync = 6,
    RenameFile = 7,
    GetAttrFile = 8,
    SetAttrFile = 9,
    MkdirDir = 10,
    RmdirDir = 11,
    RmdirDirAsync = 12,
    OpendirDir = 13,
    ReaddirDir = 14,
    ClosedirDir = 15,
    StatvfsDir = 16,
    ReadMdata = 17,
    WriteMdata = 18,
    WriteMdataFileSize = 19,
    Finalize = 20,
    Disconnect = 21,
    End = 22,
}

impl OpCode {
    const ALL: [OpCode; 23] = [
        OpCode::OpenFile,
        OpCode::CreatFile,
        OpCode::ReadFile,
        OpCode::WriteFile,
        OpCode::CloseFile,
        OpCode::RmFile,
        OpCode::RmFileAsync,
        OpCode::RenameFile,
        OpCode::GetAttrFile,
        OpCode::SetAttrFile,
        OpCode::MkdirDir,
        OpCode::RmdirDir,
        OpCode::RmdirDirAsync,
        OpCode::OpendirDir,
        OpCode::ReaddirDir,
        OpCode::ClosedirDir,
        OpCode::StatvfsDir,
        OpCode::ReadMdata,
        OpCode::WriteMdata,
        OpCode::WriteMdataFileSize,
        OpCode::Finalize,
        OpCode::Disconnect,
        OpCode::End,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OpCode::OpenFile => "OPEN_FILE",
            OpCode::CreatFile => "CREAT_FILE",
            OpCode::ReadFile => "READ_FILE",
            OpCode::WriteFile => "WRITE_FILE",
            OpCode::CloseFile => "CLOSE_FILE",
            OpCode::RmFile => "RM_FILE",
            OpCode::RmFileAsync => "RM_FILE_ASYNC",
            OpCode::RenameFile => "RENAME_FILE",
            OpCode::GetAttrFile => "GETATTR_FILE",
            OpCode::SetAttrFile => "SETATTR_FILE",
            OpCode::MkdirDir => "MKDIR_DIR",
            OpCode::RmdirDir => "RMDIR_DIR",
            OpCode::RmdirDirAsync => "RMDIR_DIR_ASYNC",
            OpCode::OpendirDir => "OPENDIR_DIR",
            OpCode::ReaddirDir => "READDIR_DIR",
            OpCode::ClosedirDir => "CLOSEDIR_DIR",
            OpCode::StatvfsDir => "STATVFS_DIR",
            OpCode::ReadMdata => "READ_MDATA",
            OpCode::WriteMdata => "WRITE_MDATA",
            OpCode::WriteMdataFileSize => "WRITE_MDATA_FILE_SIZE",
            OpCode::Finalize => "FINALIZE",
            OpCode::Disconnect => "DISCONNECT",
            OpCode::End => "END",
        }
    }

    /// Operations the client issues without waiting for a reply.
    pub fn is_fire_and_forget(self) -> bool {
        matches!(
            self,
            OpCode::RmFileAsync | OpCode::RmdirDirAsync | OpCode::WriteMdataFileSize
        )
    }
}

impl TryFrom<u32> for OpCode {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        OpCode::ALL
            .get(value as usize)
            .copied()
            .ok_or(WireError::UnknownOpcode(value))
    }
}

impl From<OpCode> for u32 {
    fn from(op: OpCode) -> u32 {
        op as u32
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values_match_table() {
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as u32, i as u32, "{} out of place", op);
            assert_eq!(OpCode::try_from(i as u32).unwrap(), *op);
        }
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(OpCode::try_from(23), Err(WireError::UnknownOpcode(23)));
        assert_eq!(OpCode::try_from(u32::MAX), Err(WireError::UnknownOpcode(u32::MAX)));
    }

    #[test]
    fn test_fire_and_forget() {
        assert!(OpCode::RmFileAsync.is_fire_and_forget());
        assert!(OpCode::WriteMdataFileSize.is_fire_and_forget());
        assert!(!OpCode::RmFile.is_fire_and_forget());
    }
}

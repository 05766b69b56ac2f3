use thiserror::Error;

/// An error from a store operation. The message of each variant is the
/// text written to the wire, prefix included.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("ERR The bit argument must be 1 or 0.")]
    BitArgument,

    #[error("ERR bit offset is not an integer or out of range")]
    BitOffset,

    #[error("ERR BITOP NOT must be called with a single source key.")]
    BitopNot,

    #[error("BUSYGROUP Consumer Group name already exists")]
    BusyGroup,

    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    IdTooSmall,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("NOGROUP No such consumer group '{group}' for key name '{key}'")]
    NoGroup { group: String, key: String },

    #[error(
        "ERR The XGROUP subcommand requires the key to exist. Note that for CREATE you may want \
         to use the MKSTREAM option to create an empty stream automatically."
    )]
    NoKey,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR Invalid stream ID specified as stream command argument")]
    StreamId,

    #[error("ERR syntax error")]
    Syntax,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
}

impl StoreError {
    pub fn no_group(group: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Self {
        StoreError::NoGroup {
            group: String::from_utf8_lossy(group.as_ref()).into_owned(),
            key: String::from_utf8_lossy(key.as_ref()).into_owned(),
        }
    }
}

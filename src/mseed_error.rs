use thiserror::Error;

#[derive(Error, Debug)]
pub enum MSeedError {
    #[error("IO Error")]
    Io(#[from] std::io::Error),
    #[error("record sink write failed")]
    Sink(#[source] std::io::Error),
    #[error("not a SEED data record: {0}")]
    NotSeed(String),
    #[error("no Blockette 1000 and no fallback encoding for {0}")]
    NoBlkt1000(String),
    #[error("record length mismatch, Blockette 1000 says {0} but expected {1}")]
    WrongLength(usize, usize),
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("unknown data encoding: `{0}`")]
    UnknownFormat(u8),
    #[error("invalid Steim-{version} compression flag {flag} at frame {frame}, word {word}")]
    SteimBadFlag {
        version: u8,
        frame: usize,
        word: usize,
        flag: u8,
    },
    #[error("difference too large to represent in Steim-{0} encoding")]
    SteimOverflow(u8),
    #[error("record truncated, needed {0} bytes but had {1}")]
    Truncated(usize, usize),
    #[error("sample type mismatch, `{0}` and `{1}`")]
    SampleTypeMismatch(&'static str, &'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot parse time string `{0}`")]
    TimeParse(String),
}

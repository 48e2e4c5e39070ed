//! `shardb` is a RAM-resident document store addressed by small opaque
//! integer identifiers, fronted by a length-prefixed binary protocol over
//! TCP and backed by an append-only log for durability.
//!
//! The crate is organized the way the storage engine it implements is
//! organized: a [`catalog`] of declared collections, a sharded
//! [`shard`]/[`shardset`] document index, a [`governor`] that gates memory
//! use and drives eviction, an [`alog`] append-only durability log, and an
//! [`engine`] facade that composes all of the above behind the
//! [`protocol`] wire format.

use std::{error, fmt, result};

/// Short form to compose [Error] values.
///
/// ```ignore
/// err_at!(Missing, msg: "no such document {}", id);
/// err_at!(IOError, std::fs::read(path));
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod alog;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod governor;
pub mod protocol;
pub mod recency;
pub mod server;
pub mod shard;
pub mod shardset;
pub mod where_expr;

pub use catalog::{Catalog, FieldType, Modifier, Schema};
pub use config::{Config, MemoryConfig};
pub use engine::Engine;
pub use protocol::{Response, Status};
pub use shardset::DocId;

/// Type alias for the `Result` returned by this crate's fallible API.
pub type Result<T> = result::Result<T, Error>;

/// Error variants returned by this crate's API.
///
/// Each variant carries a `(location_prefix, message)` pair, constructed
/// through [`err_at!`], typically identifying the source location that
/// raised it.
pub enum Error {
    IOError(String, String),
    Fatal(String, String),
    Invalid(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),
    /// The named collection or document id does not exist.
    Missing(String, String),
    /// A bulk write was refused by the memory governor.
    AdmissionRefused(String, String),
    /// The wire codec could not decode a frame.
    CodecFail(String, String),
    /// A connection-level framing violation (oversize, malformed length
    /// prefix, read timeout).
    Framing(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            Invalid(p, msg) => write!(f, "{} Invalid: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
            Missing(p, msg) => write!(f, "{} Missing: {}", p, msg),
            AdmissionRefused(p, msg) => write!(f, "{} AdmissionRefused: {}", p, msg),
            CodecFail(p, msg) => write!(f, "{} CodecFail: {}", p, msg),
            Framing(p, msg) => write!(f, "{} Framing: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

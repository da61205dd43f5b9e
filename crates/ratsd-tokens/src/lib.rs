//! Evidence token codecs for ratsd
//!
//! - [`TsmReport`]: the configfs-tsm report emitted by the TSM sub-attesters,
//!   validated and serialized to JSON or CBOR.
//! - [`cmw::Collection`]: the labelled container ratsd uses to merge the
//!   evidence of several sub-attesters into one response.
//!
//! # Example
//!
//! ```rust
//! use ratsd_tokens::TsmReport;
//!
//! # fn main() -> ratsd_tokens::Result<()> {
//! let report = TsmReport {
//!     provider: "sev_guest".to_string(),
//!     out_blob: b"report".as_slice().into(),
//!     aux_blob: b"certs".as_slice().into(),
//!     ..Default::default()
//! };
//!
//! let cbor = report.to_cbor()?;
//! assert_eq!(TsmReport::from_cbor(&cbor)?, report);
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod cmw;
pub mod errors;
pub mod tsm_report;

pub use binary::BinaryString;
pub use cmw::{Cmw, Collection, Monad};
pub use errors::{Result, TokenError};
pub use tsm_report::TsmReport;

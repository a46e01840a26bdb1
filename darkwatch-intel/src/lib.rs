//! DarkWatch Intel
//!
//! External enrichment and delivery for scan results:
//! - **Reputation**: VirusTotal v3 lookups for IPs and URLs
//! - **Notifier**: Slack-compatible webhook delivery
//! - **Alert**: threshold decision, IP enrichment and report composition

pub mod traits;
pub mod reputation;
pub mod notifier;
pub mod alert;

pub use traits::*;
pub use reputation::*;
pub use notifier::*;
pub use alert::*;

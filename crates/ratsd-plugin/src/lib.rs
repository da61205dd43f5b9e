//! Out-of-process sub-attester plugins for ratsd
//!
//! Each sub-attester runs as its own executable. The host side
//! ([`PluginLoader`], [`SubAttesterManager`]) discovers the binaries, starts
//! them and talks to them through [`PluginClient`]; the plugin side wraps an
//! attester with [`serve`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ratsd_plugin::{PluginLoader, PluginManager, SubAttesterManager};
//!
//! # async fn run() -> ratsd_plugin::Result<()> {
//! let loader = PluginLoader::new("./plugins").with_handshake_timeout(Duration::from_secs(5));
//! let manager = SubAttesterManager::create(loader).await?;
//!
//! for name in manager.plugin_list() {
//!     let attester = manager.lookup_by_name(&name)?;
//!     let formats = attester.get_supported_formats().await;
//!     println!("{name}: {:?}", formats.formats);
//! }
//!
//! manager.close().await
//! # }
//! ```

pub mod client;
pub mod contract;
pub mod errors;
pub mod loader;
pub mod manager;
pub mod serve;
pub mod wire;

pub use client::PluginClient;
pub use contract::{
    DataType, EvidenceIn, EvidenceOut, Format, OptionDescriptor, OptionsOut, Status, SubAttester,
    SubAttesterId, SubAttesterIdOut, SupportedFormatsOut,
};
pub use errors::{PluginError, Result};
pub use loader::{LoadedPlugin, PluginLoader, PLUGIN_EXTENSION};
pub use manager::{PluginManager, SubAttesterManager};
pub use serve::{serve, serve_io};

//! Typed configuration for `retrosys-di` containers.
//!
//! Configuration values are collected in a [ConfigProvider], which is registered into the
//! container as a singleton. Constructors then declare a [Config] parameter for the section
//! they need instead of depending on the whole provider.
//!
//! ```rust
//! use std::sync::Arc;
//! use retrosys_config::{provider::register_config_provider, Config, ConfigProvider};
//! use retrosys_di::{Arguments, DiContainer, DynError, Parameter, Registration};
//!
//! struct ListenConfig {
//!     bind: String,
//!     backlog: u32,
//! }
//!
//! struct Listener {
//!     endpoint: String,
//! }
//!
//! let mut provider = ConfigProvider::new();
//! provider
//!     .add_config(ListenConfig {
//!         bind: "0.0.0.0:7000".to_string(),
//!         backlog: 128,
//!     })
//!     .unwrap();
//!
//! let container = DiContainer::new();
//! register_config_provider(&container, provider);
//! container.register(Registration::constructor(
//!     vec![Parameter::of::<Config<ListenConfig>>("listen")],
//!     |args: &mut Arguments| -> Result<Listener, DynError> {
//!         let listen: Config<ListenConfig> = args.take("listen")?;
//!         Ok(Listener {
//!             endpoint: format!("{} ({})", listen.bind, listen.backlog),
//!         })
//!     },
//! ));
//!
//! let listener: Arc<Listener> = container.resolve().unwrap();
//! assert_eq!(listener.endpoint, "0.0.0.0:7000 (128)");
//! ```

pub mod config;
pub mod errors;
pub mod provider;

pub use config::Config;
pub use provider::ConfigProvider;

pub mod association;
pub mod config;
pub mod error;
pub mod filter;
pub mod logger;
pub mod manifold;
pub mod measure;
pub mod process;
pub mod state;

pub use association::{Association, associate};
pub use config::{AssociationConfig, ErrorFrame, FilterConfig};
pub use error::{InekfError, InekfResult};
pub use filter::InEKF;
pub use logger::{init_logger, init_logger_with_level};
pub use state::AugmentedState;

//! Station discovery and favorites persistence.

pub mod directory;
pub mod favorites;

pub use directory::{DirectoryError, RadioBrowserClient, StationDirectory};
pub use favorites::FavoritesStore;

// Export modules for use in tests
pub mod error;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ErrorKind, InvalidPageInput, LoadFailure, SessionError};
pub use pdf::{Phase, PixelSurface, Session, SessionConfig, SessionState, Surface};
pub use settings::{Settings, SettingsError};

pub mod driver;

pub use driver::{PageDriver, SessionProvider};

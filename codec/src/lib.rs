mod decode;
mod identity;
pub mod proto;

pub use decode::*;
pub use identity::*;

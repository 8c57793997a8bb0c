/*!
Transport implementations.
*/

pub mod memory;

pub use self::memory::{MemoryTransport, loopback};

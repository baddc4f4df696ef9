pub mod document;
pub mod io;
pub mod session;
pub mod spans;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use document::*;
pub use io::*;
pub use session::*;
pub use spans::*;

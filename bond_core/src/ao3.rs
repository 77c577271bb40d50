pub mod client;
pub mod error;
pub mod parser;
pub mod queue;
#[cfg(test)]
mod testing;
pub mod url;

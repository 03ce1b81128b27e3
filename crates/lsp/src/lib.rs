pub mod analysis;
pub mod cache;
mod completion;
pub mod config;
pub mod convert;
pub mod correlator;
pub mod diagnostics;
mod document_symbol;
mod goto_def;
mod hover;
#[cfg(test)]
mod pbt;
pub mod reactor;
pub mod server;
pub mod state;
pub mod supervisor;
pub mod test_util;
pub mod transport;

pub mod config;
pub mod error;
pub mod ip;
pub mod link;
pub mod net;
pub mod sim;
pub mod tcp;
pub mod topo;

#[cfg(test)]
mod test;

pub mod net;
pub mod sim;
pub mod topo;

#[cfg(test)]
mod test;

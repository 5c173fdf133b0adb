pub mod base;

#[cfg(test)]
pub mod mock;

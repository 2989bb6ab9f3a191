pub mod consumer;
pub mod events;
pub mod migration;
pub mod processor;
pub mod publisher;
pub mod routing;

#[cfg(test)]
pub(crate) mod test_support;

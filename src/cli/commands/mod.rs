pub mod call;
pub mod config;
pub mod execution;
pub mod system;
pub mod template;

#[cfg(test)]
mod test_support;


#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

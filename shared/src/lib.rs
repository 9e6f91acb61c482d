#[macro_use]
extern crate serde_derive;

pub mod invoker;
pub mod k8s;
pub mod os;

#![no_std]

pub mod blockdev;
pub mod fat;
mod ops;
pub mod tests;
#[cfg(test)]
extern crate std;

pub use ops::*;

pub mod codec;
pub mod destroyable;
pub mod events;
pub mod game;
pub mod helpers;
pub mod model;
pub mod source;
pub mod storage;

#[cfg(test)]
mod testing;

mod key_pool;

pub use key_pool::KeyPool;

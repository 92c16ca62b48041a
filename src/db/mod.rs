mod schema;
mod store;

pub use store::{Mutation, ScopedStore};

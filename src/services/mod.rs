pub mod backend;
pub mod database;
pub mod download;
pub mod generation;
pub mod image_generator;
pub mod local_store;
pub mod retention;
pub mod sqlite_table;
pub mod supabase;

#[cfg(test)]
pub mod testing;

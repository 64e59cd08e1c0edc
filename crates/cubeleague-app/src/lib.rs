// Library root for the cubeleague runner: config, SQLite store, pool import
// and the command-line front end over `cubeleague_core`.

pub mod cli;
pub mod config;
pub mod db;
pub mod league;
pub mod pool_import;

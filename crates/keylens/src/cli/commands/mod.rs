pub mod api_schema;
pub mod ask;
pub mod init;
pub mod repl;
pub mod schema;
pub mod serve;

pub mod client_database;
pub mod column_metadata;
pub mod relationship_metadata;
pub mod table_metadata;

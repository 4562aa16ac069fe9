//! redb table definitions for the Link Database.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow `{pop}/{router}` and
//! `{pop}/{router}/{interface}` so related records share a prefix.

use redb::TableDefinition;

/// POPs keyed by `{pop_id}`.
pub const POPS: TableDefinition<&str, &[u8]> = TableDefinition::new("pops");

/// Routers keyed by `{pop_id}/{router_id}`.
pub const ROUTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("routers");

/// Interfaces keyed by `{pop_id}/{router_id}/{interface_id}`.
pub const INTERFACES: TableDefinition<&str, &[u8]> = TableDefinition::new("interfaces");

/// Optical links (including their slot grid) keyed by `{link_id}`.
pub const LINKS: TableDefinition<&str, &[u8]> = TableDefinition::new("links");

/// Virtual operators keyed by `{vop_id}`.
pub const VOPS: TableDefinition<&str, &[u8]> = TableDefinition::new("vops");

/// Connection records keyed by `{connection_id}`.
pub const CONNECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("connections");

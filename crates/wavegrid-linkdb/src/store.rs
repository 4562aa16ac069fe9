//! LinkDb — redb-backed store for topology, reservations, and records.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use wave_core::{
    epoch_secs, Connection, ConnectionStatus, Interface, InterfaceRef, OpticalLink, Pop, Router,
    SlotState, Topology, VirtualOperator, DEFAULT_TOTAL_SLOTS,
};

use crate::error::{LinkDbError, LinkDbResult};
use crate::tables::*;

/// Convert any `Display` error into a `LinkDbError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LinkDbError::$variant(e.to_string())
    };
}

pub(crate) use map_err;

/// Thread-safe Link Database backed by redb.
#[derive(Clone)]
pub struct LinkDb {
    pub(crate) db: Arc<Database>,
}

impl LinkDb {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> LinkDbResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "link database opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> LinkDbResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory link database opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> LinkDbResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(POPS).map_err(map_err!(Table))?;
        txn.open_table(ROUTERS).map_err(map_err!(Table))?;
        txn.open_table(INTERFACES).map_err(map_err!(Table))?;
        txn.open_table(LINKS).map_err(map_err!(Table))?;
        txn.open_table(VOPS).map_err(map_err!(Table))?;
        txn.open_table(CONNECTIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON column access ─────────────────────────────────

    fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> LinkDbResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> LinkDbResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> LinkDbResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                results.push(
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?,
                );
            }
        }
        Ok(results)
    }

    fn delete_key(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> LinkDbResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            existed = t.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── POPs ───────────────────────────────────────────────────────

    /// Create a POP; fails if it already exists.
    pub fn create_pop(&self, pop: &Pop) -> LinkDbResult<()> {
        if self.get_pop(&pop.pop_id)?.is_some() {
            return Err(LinkDbError::AlreadyExists(format!("pop {}", pop.pop_id)));
        }
        self.put_json(POPS, &pop.pop_id, pop)?;
        debug!(pop = %pop.pop_id, "pop created");
        Ok(())
    }

    pub fn get_pop(&self, pop_id: &str) -> LinkDbResult<Option<Pop>> {
        self.get_json(POPS, pop_id)
    }

    pub fn list_pops(&self) -> LinkDbResult<Vec<Pop>> {
        self.list_json(POPS, "")
    }

    /// Delete a POP. Refused while links still touch it.
    pub fn delete_pop(&self, pop_id: &str) -> LinkDbResult<bool> {
        let attached = self
            .list_links()?
            .into_iter()
            .any(|l| l.touches(pop_id));
        if attached {
            return Err(LinkDbError::Conflict(format!(
                "pop {pop_id} still has attached links"
            )));
        }
        self.delete_key(POPS, pop_id)
    }

    // ── Routers ────────────────────────────────────────────────────

    pub fn create_router(&self, router: &Router) -> LinkDbResult<()> {
        if self.get_pop(&router.pop_id)?.is_none() {
            return Err(LinkDbError::NotFound(format!("pop {}", router.pop_id)));
        }
        let key = format!("{}/{}", router.pop_id, router.router_id);
        self.put_json(ROUTERS, &key, router)
    }

    pub fn get_router(&self, pop_id: &str, router_id: &str) -> LinkDbResult<Option<Router>> {
        self.get_json(ROUTERS, &format!("{pop_id}/{router_id}"))
    }

    pub fn list_routers(&self) -> LinkDbResult<Vec<Router>> {
        self.list_json(ROUTERS, "")
    }

    pub fn list_routers_for_pop(&self, pop_id: &str) -> LinkDbResult<Vec<Router>> {
        self.list_json(ROUTERS, &format!("{pop_id}/"))
    }

    /// Delete a router and its interfaces. Refused while any of its
    /// interfaces is still reserved.
    pub fn delete_router(&self, pop_id: &str, router_id: &str) -> LinkDbResult<bool> {
        let interfaces = self.list_interfaces(pop_id, router_id)?;
        if let Some(owned) = interfaces.iter().find(|i| i.owner.is_some()) {
            return Err(LinkDbError::Conflict(format!(
                "interface {} still reserved by {}",
                owned.interface_id,
                owned.owner.as_deref().unwrap_or("?")
            )));
        }
        for iface in &interfaces {
            self.delete_key(INTERFACES, &iface.table_key())?;
        }
        self.delete_key(ROUTERS, &format!("{pop_id}/{router_id}"))
    }

    // ── Interfaces ─────────────────────────────────────────────────

    pub fn put_interface(&self, interface: &Interface) -> LinkDbResult<()> {
        self.put_json(INTERFACES, &interface.table_key(), interface)
    }

    pub fn get_interface(&self, r: &InterfaceRef) -> LinkDbResult<Option<Interface>> {
        self.get_json(INTERFACES, &r.table_key())
    }

    pub fn list_interfaces(&self, pop_id: &str, router_id: &str) -> LinkDbResult<Vec<Interface>> {
        self.list_json(INTERFACES, &format!("{pop_id}/{router_id}/"))
    }

    pub fn list_all_interfaces(&self) -> LinkDbResult<Vec<Interface>> {
        self.list_json(INTERFACES, "")
    }

    /// Reserve a set of interfaces for a vOp, all-or-nothing.
    ///
    /// Every interface must exist, be unowned, and have a transceiver
    /// present. The whole batch commits in one write transaction; on any
    /// failure nothing is reserved and the offending interfaces are named.
    pub fn reserve_interfaces(&self, vop_id: &str, refs: &[InterfaceRef]) -> LinkDbResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INTERFACES).map_err(map_err!(Table))?;
            let mut unavailable = Vec::new();
            let mut updated = Vec::new();

            for r in refs {
                let key = r.table_key();
                let existing: Option<Interface> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                };
                match existing {
                    None => unavailable.push(format!("{key}: not found")),
                    Some(iface) if iface.owner.as_deref().is_some_and(|o| o != vop_id) => {
                        unavailable.push(format!(
                            "{key}: owned by {}",
                            iface.owner.as_deref().unwrap_or("?")
                        ));
                    }
                    Some(iface) if !iface.transceiver_present => {
                        unavailable.push(format!("{key}: no transceiver"));
                    }
                    Some(mut iface) => {
                        iface.owner = Some(vop_id.to_string());
                        updated.push((key, iface));
                    }
                }
            }

            if !unavailable.is_empty() {
                // Transaction is dropped without commit; nothing reserved.
                return Err(LinkDbError::InterfaceUnavailable(unavailable.join(", ")));
            }

            for (key, iface) in &updated {
                let bytes = serde_json::to_vec(iface).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(vop = vop_id, count = refs.len(), "interfaces reserved");
        Ok(())
    }

    /// Release every interface owned by a vOp. Returns the number released.
    pub fn release_interfaces(&self, vop_id: &str) -> LinkDbResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut released = 0;
        {
            let mut table = txn.open_table(INTERFACES).map_err(map_err!(Table))?;
            let owned: Vec<(String, Interface)> = {
                let mut found = Vec::new();
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (key, value) = entry.map_err(map_err!(Read))?;
                    let iface: Interface =
                        serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                    if iface.owner.as_deref() == Some(vop_id) {
                        found.push((key.value().to_string(), iface));
                    }
                }
                found
            };
            for (key, mut iface) in owned {
                iface.owner = None;
                let bytes = serde_json::to_vec(&iface).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
                released += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(vop = vop_id, released, "interfaces released");
        Ok(released)
    }

    // ── Links ──────────────────────────────────────────────────────

    /// Create a link; both endpoint POPs must exist.
    pub fn create_link(&self, link: &OpticalLink) -> LinkDbResult<()> {
        if self.get_link(&link.link_id)?.is_some() {
            return Err(LinkDbError::AlreadyExists(format!("link {}", link.link_id)));
        }
        for pop in [&link.pop_a, &link.pop_b] {
            if self.get_pop(pop)?.is_none() {
                return Err(LinkDbError::NotFound(format!("pop {pop}")));
            }
        }
        self.put_json(LINKS, &link.link_id, link)?;
        debug!(link = %link.link_id, slots = link.slots.len(), "link created");
        Ok(())
    }

    pub fn get_link(&self, link_id: &str) -> LinkDbResult<Option<OpticalLink>> {
        self.get_json(LINKS, link_id)
    }

    pub fn list_links(&self) -> LinkDbResult<Vec<OpticalLink>> {
        self.list_json(LINKS, "")
    }

    /// Delete a link; its slot grid goes with it.
    pub fn delete_link(&self, link_id: &str) -> LinkDbResult<bool> {
        self.delete_key(LINKS, link_id)
    }

    pub(crate) fn put_link(&self, link: &OpticalLink) -> LinkDbResult<()> {
        self.put_json(LINKS, &link.link_id, link)
    }

    // ── Virtual operators ──────────────────────────────────────────

    pub fn put_vop(&self, vop: &VirtualOperator) -> LinkDbResult<()> {
        self.put_json(VOPS, &vop.vop_id, vop)
    }

    pub fn get_vop(&self, vop_id: &str) -> LinkDbResult<Option<VirtualOperator>> {
        self.get_json(VOPS, vop_id)
    }

    pub fn list_vops(&self) -> LinkDbResult<Vec<VirtualOperator>> {
        self.list_json(VOPS, "")
    }

    pub fn delete_vop(&self, vop_id: &str) -> LinkDbResult<bool> {
        self.delete_key(VOPS, vop_id)
    }

    // ── Connections ────────────────────────────────────────────────

    pub fn put_connection(&self, conn: &Connection) -> LinkDbResult<()> {
        self.put_json(CONNECTIONS, &conn.connection_id, conn)
    }

    pub fn get_connection(&self, connection_id: &str) -> LinkDbResult<Option<Connection>> {
        self.get_json(CONNECTIONS, connection_id)
    }

    pub fn list_connections(&self) -> LinkDbResult<Vec<Connection>> {
        self.list_json(CONNECTIONS, "")
    }

    pub fn delete_connection(&self, connection_id: &str) -> LinkDbResult<bool> {
        self.delete_key(CONNECTIONS, connection_id)
    }

    /// Update a connection's status.
    ///
    /// Reaching `ACTIVE` also flips the connection's reserved slots to
    /// `Active` on every link of its path.
    pub fn set_connection_status(
        &self,
        connection_id: &str,
        status: ConnectionStatus,
    ) -> LinkDbResult<Connection> {
        let mut conn = self
            .get_connection(connection_id)?
            .ok_or_else(|| LinkDbError::NotFound(format!("connection {connection_id}")))?;
        conn.status = status;
        conn.updated_at = epoch_secs();
        self.put_connection(&conn)?;
        if status == ConnectionStatus::Active {
            self.set_slot_state(connection_id, SlotState::Active)?;
        }
        debug!(connection = connection_id, ?status, "connection status updated");
        Ok(conn)
    }

    /// Transition every slot owned by a connection to `state`.
    pub(crate) fn set_slot_state(
        &self,
        connection_id: &str,
        state: SlotState,
    ) -> LinkDbResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut changed = 0;
        {
            let mut table = txn.open_table(LINKS).map_err(map_err!(Table))?;
            let links: Vec<OpticalLink> = {
                let mut all = Vec::new();
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (_, value) = entry.map_err(map_err!(Read))?;
                    all.push(
                        serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?,
                    );
                }
                all
            };
            for mut link in links {
                let mut touched = false;
                for slot in &mut link.slots {
                    if slot.owner.as_deref() == Some(connection_id) {
                        slot.state = state;
                        touched = true;
                        changed += 1;
                    }
                }
                if touched {
                    let bytes = serde_json::to_vec(&link).map_err(map_err!(Serialize))?;
                    table
                        .insert(link.link_id.as_str(), bytes.as_slice())
                        .map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(changed)
    }

    // ── Topology ───────────────────────────────────────────────────

    /// Complete topology snapshot.
    pub fn topology(&self) -> LinkDbResult<Topology> {
        Ok(Topology {
            pops: self.list_pops()?,
            routers: self.list_routers()?,
            interfaces: self.list_all_interfaces()?,
            links: self.list_links()?,
        })
    }

    /// Seed the three-POP sample topology used for bring-up and tests.
    ///
    /// No-op when POPs already exist.
    pub fn seed_sample_topology(&self) -> LinkDbResult<bool> {
        if !self.list_pops()?.is_empty() {
            return Ok(false);
        }
        let now = epoch_secs();
        let pops = [
            ("pop1", "DC1", "40.7128,-74.0060"),
            ("pop2", "DC2", "34.0522,-118.2437"),
            ("pop3", "DC3", "51.5074,-0.1278"),
        ];
        for (pop_id, name, location) in pops {
            self.create_pop(&Pop {
                pop_id: pop_id.to_string(),
                name: name.to_string(),
                location: location.to_string(),
                operator: "telco".to_string(),
                created_at: now,
            })?;
            self.create_router(&Router {
                router_id: "router1".to_string(),
                pop_id: pop_id.to_string(),
                model: "Edgecore".to_string(),
                created_at: now,
            })?;
            for (iface, port) in [("Ethernet48", 48u32), ("Ethernet56", 56u32)] {
                self.put_interface(&Interface {
                    interface_id: iface.to_string(),
                    router_id: "router1".to_string(),
                    pop_id: pop_id.to_string(),
                    port_num: port,
                    owner: None,
                    admin_up: true,
                    oper_up: false,
                    transceiver_present: true,
                })?;
            }
        }
        self.create_link(&OpticalLink::new(
            "link-pop1-pop2",
            "pop1",
            "pop2",
            100.5,
            DEFAULT_TOTAL_SLOTS,
            now,
        ))?;
        self.create_link(&OpticalLink::new(
            "link-pop2-pop3",
            "pop2",
            "pop3",
            150.2,
            DEFAULT_TOTAL_SLOTS,
            now,
        ))?;
        info!("sample topology seeded");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::VopStatus;

    fn seeded() -> LinkDb {
        let db = LinkDb::open_in_memory().unwrap();
        db.seed_sample_topology().unwrap();
        db
    }

    fn iface_ref(pop: &str, iface: &str) -> InterfaceRef {
        InterfaceRef {
            pop_id: pop.to_string(),
            router_id: "router1".to_string(),
            interface_id: iface.to_string(),
        }
    }

    #[test]
    fn seed_is_idempotent() {
        let db = seeded();
        assert!(!db.seed_sample_topology().unwrap());
        assert_eq!(db.list_pops().unwrap().len(), 3);
        assert_eq!(db.list_links().unwrap().len(), 2);
    }

    #[test]
    fn pop_create_duplicate_rejected() {
        let db = seeded();
        let pop = db.get_pop("pop1").unwrap().unwrap();
        assert!(matches!(
            db.create_pop(&pop),
            Err(LinkDbError::AlreadyExists(_))
        ));
    }

    #[test]
    fn pop_delete_refused_with_links() {
        let db = seeded();
        assert!(matches!(db.delete_pop("pop1"), Err(LinkDbError::Conflict(_))));
        assert!(db.delete_pop("pop3").is_err()); // pop3 has a link too
    }

    #[test]
    fn link_requires_existing_pops() {
        let db = seeded();
        let link = OpticalLink::new("link-x", "pop1", "nowhere", 10.0, 8, 0);
        assert!(matches!(db.create_link(&link), Err(LinkDbError::NotFound(_))));
    }

    #[test]
    fn reserve_marks_owner() {
        let db = seeded();
        db.reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet56")])
            .unwrap();
        let iface = db.get_interface(&iface_ref("pop1", "Ethernet56")).unwrap().unwrap();
        assert_eq!(iface.owner.as_deref(), Some("vOp2"));
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let db = seeded();
        let result = db.reserve_interfaces(
            "vOp2",
            &[iface_ref("pop1", "Ethernet56"), iface_ref("pop1", "Ethernet99")],
        );
        assert!(matches!(result, Err(LinkDbError::InterfaceUnavailable(_))));
        // The good interface must not be left reserved.
        let iface = db.get_interface(&iface_ref("pop1", "Ethernet56")).unwrap().unwrap();
        assert!(iface.owner.is_none());
    }

    #[test]
    fn reserve_rejects_foreign_owner() {
        let db = seeded();
        db.reserve_interfaces("vOp1", &[iface_ref("pop1", "Ethernet48")])
            .unwrap();
        let result = db.reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet48")]);
        assert!(matches!(result, Err(LinkDbError::InterfaceUnavailable(_))));
    }

    #[test]
    fn release_clears_only_this_vop() {
        let db = seeded();
        db.reserve_interfaces("vOp1", &[iface_ref("pop1", "Ethernet48")])
            .unwrap();
        db.reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet56")])
            .unwrap();

        assert_eq!(db.release_interfaces("vOp2").unwrap(), 1);
        let kept = db.get_interface(&iface_ref("pop1", "Ethernet48")).unwrap().unwrap();
        assert_eq!(kept.owner.as_deref(), Some("vOp1"));
    }

    #[test]
    fn router_delete_refused_while_interfaces_reserved() {
        let db = seeded();
        db.reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet56")])
            .unwrap();
        assert!(matches!(
            db.delete_router("pop1", "router1"),
            Err(LinkDbError::Conflict(_))
        ));

        db.release_interfaces("vOp2").unwrap();
        assert!(db.delete_router("pop1", "router1").unwrap());
        assert!(db.list_interfaces("pop1", "router1").unwrap().is_empty());
        assert!(db.get_router("pop1", "router1").unwrap().is_none());
    }

    #[test]
    fn vop_registry_roundtrip() {
        let db = seeded();
        let vop = VirtualOperator {
            vop_id: "vOp2".to_string(),
            tenant_name: "CloudProviderB".to_string(),
            description: None,
            status: VopStatus::Active,
            topics: wave_core::VopTopics::for_vop("vOp2"),
            interfaces: vec![iface_ref("pop1", "Ethernet56")],
            created_at: 1000,
            updated_at: 1000,
        };
        db.put_vop(&vop).unwrap();
        assert_eq!(db.get_vop("vOp2").unwrap(), Some(vop));
        assert_eq!(db.list_vops().unwrap().len(), 1);
        assert!(db.delete_vop("vOp2").unwrap());
        assert!(db.get_vop("vOp2").unwrap().is_none());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkdb.redb");
        {
            let db = LinkDb::open(&path).unwrap();
            db.seed_sample_topology().unwrap();
        }
        let db = LinkDb::open(&path).unwrap();
        assert_eq!(db.list_pops().unwrap().len(), 3);
        let link = db.get_link("link-pop1-pop2").unwrap().unwrap();
        assert_eq!(link.slots.len(), DEFAULT_TOTAL_SLOTS);
    }

    #[test]
    fn empty_store_operations() {
        let db = LinkDb::open_in_memory().unwrap();
        assert!(db.list_pops().unwrap().is_empty());
        assert!(db.list_links().unwrap().is_empty());
        assert!(db.list_connections().unwrap().is_empty());
        assert!(!db.delete_vop("nope").unwrap());
        assert_eq!(db.release_interfaces("nope").unwrap(), 0);
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::connection::{Connection, ConnectionId};
use std::{collections::HashMap, net::SocketAddr};

/// Stable handle to a connection owned by a [`Table`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(usize);

/// Owns every connection of an endpoint and resolves incoming packets to
/// them, either by destination connection ID or by peer address.
///
/// The table is append-mostly: entries leave only through [`Table::remove`],
/// on explicit deletion or fatal early errors.
#[derive(Debug, Default)]
pub struct Table {
    slots: Vec<Option<Connection>>,
    by_id: HashMap<ConnectionId, Handle>,
    by_address: HashMap<SocketAddr, Handle>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection, registering its local and initial IDs and its
    /// first path's peer address
    pub fn insert(&mut self, connection: Connection) -> Handle {
        let handle = Handle(self.slots.len());

        self.by_id.insert(*connection.local_id(), handle);
        self.by_id.insert(*connection.initial_id(), handle);
        if let Some(path) = connection.path(0) {
            self.by_address.insert(path.peer_address, handle);
        }

        self.slots.push(Some(connection));
        handle
    }

    /// Registers an additional connection ID for an existing connection
    pub fn register_id(&mut self, handle: Handle, id: ConnectionId) {
        if self.get(handle).is_some() {
            self.by_id.insert(id, handle);
        }
    }

    /// Looks a connection up by destination connection ID bytes
    pub fn by_id(&self, id: &[u8]) -> Option<Handle> {
        let id = ConnectionId::try_from_bytes(id)?;
        self.by_id.get(&id).copied()
    }

    /// Looks a connection up by peer address; used when the endpoint has no
    /// configured connection ID length
    pub fn by_address(&self, address: &SocketAddr) -> Option<Handle> {
        self.by_address.get(address).copied()
    }

    pub fn get(&self, handle: Handle) -> Option<&Connection> {
        self.slots.get(handle.0)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Connection> {
        self.slots.get_mut(handle.0)?.as_mut()
    }

    /// Removes a connection and all of its registrations
    pub fn remove(&mut self, handle: Handle) -> Option<Connection> {
        let connection = self.slots.get_mut(handle.0)?.take()?;

        self.by_id.retain(|_, registered| *registered != handle);
        self.by_address.retain(|_, registered| *registered != handle);

        Some(connection)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Connection)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((Handle(index), slot.as_ref()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testing as crypto_testing;

    fn test_connection(id: &[u8], port: u16) -> Connection {
        Connection::new_server(
            ConnectionId::try_from_bytes(id).unwrap(),
            ConnectionId::try_from_bytes(id).unwrap(),
            ConnectionId::try_from_bytes(&[0xee]).unwrap(),
            format!("192.0.2.1:{port}").parse().unwrap(),
            "192.0.2.2:4433".parse().unwrap(),
            0,
            0xff00_001d,
            crypto_testing::initial_context(0xff00_001d, id),
            None,
        )
    }

    #[test]
    fn lookup_test() {
        let mut table = Table::new();
        let a = table.insert(test_connection(&[1, 2, 3, 4], 1000));
        let b = table.insert(test_connection(&[5, 6, 7, 8], 2000));

        assert_eq!(table.by_id(&[1, 2, 3, 4]), Some(a));
        assert_eq!(table.by_id(&[5, 6, 7, 8]), Some(b));
        assert_eq!(table.by_id(&[9, 9, 9, 9]), None);

        assert_eq!(
            table.by_address(&"192.0.2.1:1000".parse().unwrap()),
            Some(a)
        );
        assert_eq!(table.by_address(&"192.0.2.1:3000".parse().unwrap()), None);

        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_test() {
        let mut table = Table::new();
        let a = table.insert(test_connection(&[1, 2, 3, 4], 1000));

        assert!(table.remove(a).is_some());
        assert!(table.remove(a).is_none());
        assert_eq!(table.by_id(&[1, 2, 3, 4]), None);
        assert_eq!(table.by_address(&"192.0.2.1:1000".parse().unwrap()), None);
        assert!(table.is_empty());
    }
}

use std::collections::BTreeMap;

use crate::display::RouteRow;
use crate::types::{Address, RouteEntry};

/// Destination to route mapping. Rebuilt from scratch on every computation
/// and published whole.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: BTreeMap<Address, RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert or replace the route to `entry.dest()`
    pub fn add_route(&mut self, entry: RouteEntry) {
        self.entries.insert(entry.dest(), entry);
    }

    pub fn get(&self, dest: Address) -> Option<&RouteEntry> {
        self.entries.get(&dest)
    }

    pub(crate) fn get_mut(&mut self, dest: Address) -> Option<&mut RouteEntry> {
        self.entries.get_mut(&dest)
    }

    pub fn next_hop(&self, dest: Address) -> Option<Address> {
        self.entries.get(&dest).and_then(|e| e.next_hop)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Routes in destination order
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    pub fn rows(&self) -> Vec<RouteRow> {
        self.iter()
            .map(|e| RouteRow {
                dest: e.dest(),
                next_hop: e.next_hop,
                dist: e.dist(),
            })
            .collect()
    }

    /// Same destinations, each with the same distance and next hop.
    pub fn same_routes(&self, other: &RoutingTable) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(dest, e)| other.entries.get(dest).is_some_and(|o| e.same_route(o)))
    }
}

impl PartialEq for RoutingTable {
    fn eq(&self, other: &Self) -> bool {
        self.same_routes(other)
    }
}

impl Eq for RoutingTable {}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(c: char) -> Address {
        Address::new(c).unwrap()
    }

    fn table(routes: &[(char, Option<char>, u32)]) -> RoutingTable {
        let mut table = RoutingTable::new();
        for &(dest, hop, dist) in routes {
            table.add_route(RouteEntry::new(addr(dest), hop.map(addr), dist));
        }
        table
    }

    #[test]
    fn test_equal_tables() {
        let a = table(&[('A', None, 0), ('B', Some('B'), 1), ('C', Some('B'), 2)]);
        let mut b = table(&[('C', Some('B'), 2), ('A', None, 0), ('B', Some('B'), 1)]);
        if let Some(e) = b.get_mut(addr('B')) {
            e.set_final();
        }
        assert_eq!(a, b);
        assert!(a.same_routes(&b));
    }

    #[test]
    fn test_differing_tables() {
        let a = table(&[('A', None, 0), ('B', Some('B'), 1), ('C', Some('B'), 2)]);

        let other_hop = table(&[('A', None, 0), ('B', Some('B'), 1), ('C', Some('C'), 2)]);
        let other_dist = table(&[('A', None, 0), ('B', Some('B'), 1), ('C', Some('B'), 3)]);
        let fewer = table(&[('A', None, 0), ('B', Some('B'), 1)]);

        assert_ne!(a, other_hop);
        assert_ne!(a, other_dist);
        assert_ne!(a, fewer);
        assert_ne!(fewer, a);
    }

    #[test]
    fn test_next_hop_and_rows() {
        let t = table(&[('A', None, 0), ('C', Some('B'), 2)]);
        assert_eq!(t.next_hop(addr('C')), Some(addr('B')));
        assert_eq!(t.next_hop(addr('A')), None);
        assert_eq!(t.next_hop(addr('Z')), None);

        let rows = t.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dest, addr('A'));
        assert_eq!(rows[1].next_hop, Some(addr('B')));
    }
}

// tests/property/dispatch_test.rs

//! Properties of the dispatch table: last registration wins, and unknown
//! names are never found.

use hookline::connection::{Connection, Outbound};
use hookline::core::dispatch::CommandTable;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Weak;

fn reply_of(table: &CommandTable, name: &str) -> Option<String> {
    let peer = "127.0.0.1:9".parse().unwrap();
    let (conn, mut rx) = Connection::channel(1, peer, Weak::new());
    table.lookup(name)?.handle(&conn, "");
    match rx.try_recv() {
        Ok(Outbound::Frame(frame)) => Some(frame),
        _ => None,
    }
}

proptest! {
    #[test]
    fn test_last_write_wins(
        registrations in prop::collection::vec(("[a-d]{1,2}", any::<u32>()), 1..40),
    ) {
        let mut table = CommandTable::new();
        let mut expected: HashMap<String, u32> = HashMap::new();
        for (name, id) in &registrations {
            let id = *id;
            table.register(name, "prop", move |conn, _| {
                conn.send(id.to_string());
            });
            expected.insert(name.clone(), id);
        }

        prop_assert_eq!(table.len(), expected.len());
        for (name, id) in &expected {
            prop_assert_eq!(reply_of(&table, name), Some(id.to_string()));
        }
    }

    #[test]
    fn test_unregistered_names_are_not_found(
        registered in prop::collection::hash_set("[a-z]{1,6}", 0..20),
        query in "[A-Z]{1,6}",
    ) {
        let mut table = CommandTable::new();
        for name in &registered {
            table.register(name, "prop", |_, _| {});
        }
        // Queries are upper case, registrations lower case.
        prop_assert!(table.lookup(&query).is_none());
    }
}

#![no_main]

use hashmesh_dht::{NodeInfo, RoutingTable, K};
use hashmesh_protocol::{Hash, NodeId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Routing table operations must not panic on arbitrary ids
    let mut routing_table = RoutingTable::new(NodeId::from_bytes([1u8; 32]));

    for chunk in data.chunks_exact(32) {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(chunk);

        routing_table.add_or_update(NodeInfo::new(NodeId::from_bytes(bytes)));
        if bytes[0] & 1 == 1 {
            routing_table.record_failure(&NodeId::from_bytes(bytes));
        }
    }

    let mut target = [0u8; 32];
    let n = data.len().min(32);
    target[..n].copy_from_slice(&data[..n]);

    let closest = routing_table.get_k_closest(&Hash::from_bytes(target), K);
    assert!(closest.len() <= K);
    assert!(closest.len() <= routing_table.node_count());
});

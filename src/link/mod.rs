
// Link side: the dispatch thread and the datagram channel it owns.
// Diffs requested state against what the actuator has acknowledged and
// sends the change with minimum latency.
pub mod transport;
pub mod dispatch_loop;

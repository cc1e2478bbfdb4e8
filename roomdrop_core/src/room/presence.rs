//! Presence snapshots.
//!
//! After every membership change the owning room actor rebuilds the complete
//! device list and pushes it to every member. Consumers diff successive
//! snapshots to derive joined/left notifications; the server's obligation is
//! only a complete, consistent list after each mutation.

use std::collections::HashMap;

use crate::protocol::{DeviceInfo, ServerMessage};

use super::actor::Member;

/// Build the full device list for a room, in a stable order.
pub fn snapshot(members: &HashMap<String, Member>) -> ServerMessage {
    let mut devices: Vec<DeviceInfo> = members.values().map(|m| m.info.clone()).collect();
    devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    ServerMessage::DevicesUpdated { devices }
}

/// Deliver the current snapshot to every member of the room.
///
/// Delivery uses `try_send`: the single actor task must never block on a
/// consumer that has stopped draining its channel. Snapshots originate only
/// from the actor, so each member's channel sees them in mutation order — a
/// device that just joined always receives the snapshot containing itself
/// before anything newer.
pub fn broadcast_snapshot(room_code: &str, members: &HashMap<String, Member>) {
    let message = snapshot(members);
    for member in members.values() {
        if member.outbound.try_send(message.clone()).is_err() {
            tracing::warn!(
                room = %room_code,
                device = %member.info.id,
                "dropping presence snapshot for unresponsive device"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn member(id: &str, name: &str) -> (String, Member, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (
            id.to_string(),
            Member {
                info: DeviceInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                    platform: "test".to_string(),
                },
                outbound: tx,
            },
            rx,
        )
    }

    #[test]
    fn snapshot_lists_every_member_in_stable_order() {
        let mut members = HashMap::new();
        let mut receivers = Vec::new();
        for (id, m, rx) in [
            member("dev-c", "Tablet"),
            member("dev-a", "Laptop"),
            member("dev-b", "Phone"),
        ] {
            members.insert(id, m);
            receivers.push(rx);
        }

        match snapshot(&members) {
            ServerMessage::DevicesUpdated { devices } => {
                let names: Vec<_> = devices.iter().map(|d| d.name.as_str()).collect();
                assert_eq!(names, vec!["Laptop", "Phone", "Tablet"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

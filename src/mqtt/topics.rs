//! Device topic-tree naming (spec §4.3, §4.7). The exact vendor wire
//! protocol (topic strings, JSON payload shapes) is not recoverable from
//! anything in the reference pack or from `original_source/` (empty in this
//! build) -- per spec §9 this must stay an explicitly acknowledged unknown
//! rather than a guessed-at vendor format. What follows is a plausible,
//! clearly-isolated topic scheme so the rest of the controller has something
//! concrete to subscribe/publish against; replacing it with the real
//! vendor scheme is a drop-in change confined to this file.

pub fn wildcard_subscription(device_id: &str) -> String {
    format!("anycubic/{device_id}/#")
}

pub fn command_topic(device_id: &str) -> String {
    format!("anycubic/{device_id}/command")
}

pub fn ack_topic(device_id: &str) -> String {
    format!("anycubic/{device_id}/ack")
}

pub fn state_topic(device_id: &str) -> String {
    format!("anycubic/{device_id}/state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_scoped_to_device_id() {
        assert_eq!(command_topic("D1"), "anycubic/D1/command");
        assert_eq!(ack_topic("D1"), "anycubic/D1/ack");
        assert!(wildcard_subscription("D1").starts_with("anycubic/D1/"));
    }
}

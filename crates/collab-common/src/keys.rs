//! Redis key and room naming conventions.

use uuid::Uuid;

/// Pub/Sub channel all replicas subscribe to.
pub const UPDATES_CHANNEL: &str = "todo:updates";

/// Redis hash holding the authoritative (L2) state of one list.
pub fn state_key(list_id: Uuid) -> String {
    format!("todo:state:{list_id}")
}

/// Personal room a user's sockets join for user-targeted notifications.
pub fn user_room(user_id: Uuid) -> String {
    format!("user_{user_id}")
}

/// Room carrying fan-out for one list. Sockets join it after a
/// permission check.
pub fn list_room(list_id: Uuid) -> String {
    list_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        let id = Uuid::nil();
        assert_eq!(
            state_key(id),
            "todo:state:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(user_room(id), "user_00000000-0000-0000-0000-000000000000");
        assert_eq!(list_room(id), id.to_string());
    }
}

use bodham_gateway::Gateway;
use bodham_sync::{CollectionStore, MutationController, MutationKind, Position};
use bodham_types::api::LiveRoomRequest;
use bodham_types::models::{LiveRoom, RoomAccess};
use tracing::info;

use crate::error::ApiError;
use crate::session::{Session, non_blank};

const ROOMS_PATH: &str = "sessions/rooms";

/// A host's upcoming live sessions, in schedule order.
pub struct HostService {
    gateway: Gateway,
    session: Session,
    rooms: MutationController<LiveRoom>,
}

impl HostService {
    /// Fails with `Forbidden` unless the user is a verified host.
    pub fn new(gateway: Gateway, session: Session) -> Result<Self, ApiError> {
        session.require_host()?;
        Ok(Self {
            gateway,
            session,
            rooms: MutationController::new(CollectionStore::new()),
        })
    }

    pub fn store(&self) -> &CollectionStore<LiveRoom> {
        self.rooms.store()
    }

    pub fn rooms(&self) -> Vec<LiveRoom> {
        self.store().items()
    }

    fn host(&self) -> [(&str, &str); 1] {
        [("user_id", self.session.user_id())]
    }

    /// Upcoming rooms, narrowed to the ones this host runs.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        let host_id = self.session.user_id();
        let fetch = async {
            let mut rooms: Vec<LiveRoom> = self.gateway.get(ROOMS_PATH, &[("status", "upcoming")]).await?;
            rooms.retain(|r| r.host_id == host_id);
            rooms.sort_by_key(|r| r.scheduled_at);
            Ok::<_, ApiError>(rooms)
        };
        Ok(self.store().refresh(fetch).await?)
    }

    pub async fn create(&self, room: LiveRoomRequest) -> Result<LiveRoom, ApiError> {
        validate(&room)?;
        let host = self.host();
        let at = self
            .store()
            .filtered(|r| r.scheduled_at <= room.scheduled_at)
            .len();
        let host_id = self.session.user_id();
        let created = self
            .rooms
            .insert_confirmed(
                self.gateway.post(ROOMS_PATH, &host, &room),
                Position::Index(at),
                |r| r.host_id == host_id,
            )
            .await?;
        info!(room_id = %created.id, "live room scheduled");
        Ok(created)
    }

    pub async fn update(&self, id: &str, room: LiveRoomRequest) -> Result<LiveRoom, ApiError> {
        validate(&room)?;
        self.ensure_editable(id)?;
        let path = format!("{ROOMS_PATH}/{id}");
        let host = self.host();
        let edit = |current: &mut LiveRoom| {
            current.title = room.title.clone();
            current.kind = room.kind;
            current.access = room.access;
            current.price = room.price;
            current.scheduled_at = room.scheduled_at;
            current.duration = room.duration;
        };
        let revert = |current: &mut LiveRoom, before: &LiveRoom| {
            current.title = before.title.clone();
            current.kind = before.kind;
            current.access = before.access;
            current.price = before.price;
            current.scheduled_at = before.scheduled_at;
            current.duration = before.duration;
        };
        let confirm = async {
            self.gateway
                .put::<_, LiveRoom>(&path, &host, &room)
                .await
                .map(Some)
        };
        Ok(self.rooms.apply(id, MutationKind::Update, edit, revert, confirm).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.ensure_editable(id)?;
        let path = format!("{ROOMS_PATH}/{id}");
        let host = self.host();
        self.rooms
            .remove(id, MutationKind::Delete, self.gateway.delete(&path, &host))
            .await?;
        info!(room_id = id, "live room cancelled");
        Ok(())
    }

    /// Unknown ids fall through so the controller reports them uniformly.
    fn ensure_editable(&self, id: &str) -> Result<(), ApiError> {
        match self.store().find_by_id(id) {
            Some(room) if !room.is_editable_by(self.session.user_id()) => Err(ApiError::forbidden(
                "Only upcoming sessions you host can be changed",
            )),
            _ => Ok(()),
        }
    }
}

fn validate(room: &LiveRoomRequest) -> Result<(), ApiError> {
    non_blank(&room.title, "Session title")?;
    if room.duration == 0 {
        return Err(ApiError::invalid("Duration must be at least one minute"));
    }
    match room.access {
        RoomAccess::Paid if !(room.price.is_finite() && room.price > 0.0) => {
            Err(ApiError::invalid("Paid sessions need a price"))
        }
        RoomAccess::Free if room.price != 0.0 => Err(ApiError::invalid("Free sessions cannot have a price")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use bodham_types::models::{Role, RoomKind};
    use chrono::Utc;

    use super::*;
    use crate::session::fixtures::user;

    fn request(access: RoomAccess, price: f64) -> LiveRoomRequest {
        LiveRoomRequest {
            title: "Evening meditation".into(),
            kind: RoomKind::Group,
            access,
            price,
            scheduled_at: Utc::now(),
            duration: 45,
        }
    }

    #[test]
    fn test_validate_pricing() {
        assert!(validate(&request(RoomAccess::Free, 0.0)).is_ok());
        assert!(validate(&request(RoomAccess::Paid, 10.0)).is_ok());
        assert!(validate(&request(RoomAccess::Paid, 0.0)).is_err());
        assert!(validate(&request(RoomAccess::Free, 5.0)).is_err());

        let mut zero = request(RoomAccess::Free, 0.0);
        zero.duration = 0;
        assert!(matches!(validate(&zero), Err(ApiError::Invalid(_))));
    }

    #[test]
    fn test_non_host_is_forbidden() {
        let gateway = Gateway::new(url::Url::parse("http://localhost:8000/api/").unwrap());
        let session = Session::new(user("u1", Role::User));
        assert!(matches!(
            HostService::new(gateway, session),
            Err(ApiError::Forbidden(_))
        ));
    }
}

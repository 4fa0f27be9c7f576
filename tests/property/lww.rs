//! Property-based tests for Last-Write-Wins semantics.

use proptest::prelude::*;
use uuid::Uuid;

use xfscene::backend::session::state::{MutationOp, SessionState};
use xfscene::shared::envelope::{
    CreateObjectPayload, DeleteObjectPayload, UpdateNamePayload, UpdateTransformPayload,
};
use xfscene::shared::scene::{ObjectKind, ObjectProperties, Transform};

fn object_pool(index: u8) -> Uuid {
    // A small fixed pool so commands collide on the same objects.
    Uuid::from_u128(0xA000 + index as u128)
}

fn transform_at(x: f64) -> Transform {
    Transform {
        position: [x, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0],
        scale: [1.0, 1.0, 1.0],
    }
}

fn create(object: u8) -> MutationOp {
    MutationOp::CreateObject(CreateObjectPayload {
        object_id: object_pool(object),
        name: format!("obj-{object}"),
        kind: ObjectKind::Cube,
        asset_id: None,
        asset_library: None,
        transform: Transform::identity(),
        properties: ObjectProperties::Empty {},
    })
}

/// (user, timestamp, op) command triples over a small object pool.
fn command_strategy() -> impl Strategy<Value = (String, u64, MutationOp)> {
    let user = (0..3u8).prop_map(|u| format!("u{u}"));
    let timestamp = 1..4000u64;
    let op = prop_oneof![
        (0..4u8).prop_map(create),
        (0..4u8).prop_map(|o| MutationOp::DeleteObject(DeleteObjectPayload {
            object_id: object_pool(o),
        })),
        ((0..4u8), 0..100u32).prop_map(|(o, x)| MutationOp::UpdateTransform(
            UpdateTransformPayload {
                object_id: object_pool(o),
                transform: transform_at(x as f64),
            }
        )),
        ((0..4u8), 0..100u32).prop_map(|(o, n)| MutationOp::UpdateName(UpdateNamePayload {
            object_id: object_pool(o),
            name: format!("name-{n}"),
        })),
    ];
    (user, timestamp, op)
}

proptest! {
    /// For every object, the stored transform is the one carried by the
    /// accepted update with the greatest timestamp; ties keep the earlier
    /// arrival. Checked against an independent reference fold.
    #[test]
    fn lww_keeps_the_newest_accepted_transform(
        commands in prop::collection::vec(command_strategy(), 1..80)
    ) {
        let mut state = SessionState::new("prop");
        // Reference model: object -> (last_updated_at, position_x), folded
        // with the plain LWW rule.
        let mut model: std::collections::HashMap<Uuid, (u64, Transform)> =
            std::collections::HashMap::new();

        for (user, timestamp, op) in &commands {
            let _ = state.apply_mutation(user, *timestamp, op);
            match op {
                MutationOp::CreateObject(p) => {
                    model.entry(p.object_id).or_insert((*timestamp, p.transform.clone()));
                }
                MutationOp::DeleteObject(p) => {
                    model.remove(&p.object_id);
                }
                MutationOp::UpdateTransform(p) => {
                    if let Some((last, transform)) = model.get_mut(&p.object_id) {
                        if *timestamp > *last {
                            *last = *timestamp;
                            *transform = p.transform.clone();
                        }
                    }
                }
                MutationOp::UpdateName(p) => {
                    if let Some((last, _)) = model.get_mut(&p.object_id) {
                        if *timestamp > *last {
                            *last = *timestamp;
                        }
                    }
                }
                MutationOp::UpdateProperties(_) => {}
            }
        }

        prop_assert_eq!(state.objects().len(), model.len());
        for (object_id, (last, transform)) in &model {
            let object = &state.objects()[object_id];
            prop_assert_eq!(object.last_updated_at, *last);
            prop_assert_eq!(&object.transform, transform);
        }
    }

    /// Applying DELETE_OBJECT twice leaves state identical to applying it
    /// once, and never panics.
    #[test]
    fn delete_is_idempotent(
        commands in prop::collection::vec(command_strategy(), 0..40),
        target in 0..4u8,
        timestamp in 4000..5000u64,
    ) {
        let mut state = SessionState::new("prop");
        for (user, ts, op) in &commands {
            let _ = state.apply_mutation(user, *ts, op);
        }

        let op = MutationOp::DeleteObject(DeleteObjectPayload {
            object_id: object_pool(target),
        });
        let _ = state.apply_mutation("u0", timestamp, &op);
        let once = state.snapshot();
        let second = state.apply_mutation("u0", timestamp + 1, &op);

        prop_assert!(second.expect("delete never errors").is_none());
        prop_assert_eq!(state.objects(), &once.objects);
    }

    /// No two accepted CREATE_OBJECT commands carry the same id while the
    /// first object is alive.
    #[test]
    fn create_is_unique_per_live_id(
        creates in prop::collection::vec((0..4u8, 1..4000u64), 1..40)
    ) {
        let mut state = SessionState::new("prop");
        let mut accepted = std::collections::HashSet::new();
        for (object, timestamp) in creates {
            let op = create(object);
            if state.apply_mutation("u0", timestamp, &op).is_ok() {
                prop_assert!(
                    accepted.insert(object_pool(object)),
                    "second CREATE accepted for a live id"
                );
            }
        }
    }
}

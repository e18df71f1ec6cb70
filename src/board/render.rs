use std::collections::HashMap;

use super::markup;
use super::slots::{SlotChange, SlotTable};
use crate::models::soundboard::SoundboardSlot;
use crate::models::user::UserInfo;
use crate::storage::{StoredSound, StoredSoundIndex};

/// Everything a fragment depends on besides the slot itself.
pub struct RenderContext<'a> {
    pub presence: bool,
    pub operator_id: &'a str,
    pub users: &'a HashMap<String, UserInfo>,
    pub stored: &'a StoredSoundIndex,
}

/// Display model for one occupied or empty position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView<'a> {
    pub ordinal: usize,
    pub slot: &'a SoundboardSlot,
    pub owner_name: &'a str,
    pub owner_avatar: Option<&'a str>,
    pub can_send: bool,
    pub can_save: bool,
    pub owned_by_operator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSoundView<'a> {
    pub index: usize,
    pub sound: &'a StoredSound,
    pub on_soundboard: bool,
    pub can_add: bool,
    pub can_send: bool,
}

pub fn slot_view<'a>(
    ctx: &RenderContext<'a>,
    ordinal: usize,
    slot: &'a SoundboardSlot,
) -> SlotView<'a> {
    let cached = ctx.users.get(&slot.owner_id);
    let owner_name = cached
        .map(|u| u.username.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(slot.owner_id.as_str());
    let owner_avatar = cached
        .and_then(|u| u.avatar.as_deref())
        .or(slot.owner_avatar.as_deref());

    SlotView {
        ordinal,
        slot,
        owner_name,
        owner_avatar,
        can_send: ctx.presence,
        can_save: !slot.is_empty() && !ctx.stored.contains(&slot.name),
        owned_by_operator: !slot.is_empty() && slot.owner_id == ctx.operator_id,
    }
}

pub fn stored_views<'a>(ctx: &RenderContext<'a>, table: &SlotTable) -> Vec<StoredSoundView<'a>> {
    let full = table.is_full();
    ctx.stored
        .iter()
        .enumerate()
        .map(|(index, sound)| {
            let on_soundboard = table.contains_name(&sound.name);
            StoredSoundView {
                index,
                sound,
                on_soundboard,
                can_add: !full && !on_soundboard,
                can_send: ctx.presence,
            }
        })
        .collect()
}

pub fn render_slot(ctx: &RenderContext<'_>, ordinal: usize, slot: &SoundboardSlot) -> String {
    if slot.is_empty() {
        return markup::empty_slot(ordinal);
    }
    markup::slot(&slot_view(ctx, ordinal, slot))
}

pub fn render_stored(ctx: &RenderContext<'_>, table: &SlotTable) -> String {
    markup::stored_panel(&stored_views(ctx, table))
}

/// Fragments for the changed positions followed by the stored-sound panel,
/// whose add buttons depend on which names are on the board.
pub fn render_changes(ctx: &RenderContext<'_>, table: &SlotTable, changes: &[SlotChange]) -> String {
    let mut out = String::new();
    for change in changes {
        out.push_str(&render_slot(ctx, change.ordinal, &change.slot));
    }
    out.push_str(&render_stored(ctx, table));
    out
}

pub fn render_slots(ctx: &RenderContext<'_>, table: &SlotTable) -> String {
    table
        .slots()
        .iter()
        .enumerate()
        .map(|(ordinal, slot)| render_slot(ctx, ordinal, slot))
        .collect()
}

/// Complete board state for a viewer that just connected.
pub fn render_board(ctx: &RenderContext<'_>, table: &SlotTable) -> String {
    let mut out = render_stored(ctx, table);
    out.push_str(&render_slots(ctx, table));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::soundboard::RemoteSound;

    fn remote(id: &str, name: &str, owner: &str) -> RemoteSound {
        RemoteSound {
            sound_id: id.to_string(),
            name: name.to_string(),
            user_id: owner.to_string(),
            user: None,
        }
    }

    fn stored(name: &str) -> StoredSound {
        StoredSound {
            name: name.to_string(),
            extension: "mp3".to_string(),
            bytes: Vec::new(),
        }
    }

    #[test]
    fn send_is_gated_on_presence() {
        let users = HashMap::new();
        let index = StoredSoundIndex::default();
        let mut table = SlotTable::new();
        table.reconcile(&[remote("A", "boo", "u1")]);
        let slot = table.get(0).unwrap();

        let absent = RenderContext {
            presence: false,
            operator_id: "me",
            users: &users,
            stored: &index,
        };
        assert!(!slot_view(&absent, 0, slot).can_send);
        assert!(render_slot(&absent, 0, slot).contains("disabled"));

        let present = RenderContext {
            presence: true,
            ..absent
        };
        assert!(slot_view(&present, 0, slot).can_send);
        assert!(!render_slot(&present, 0, slot).contains("disabled"));
    }

    #[test]
    fn save_offered_only_for_unstored_names() {
        let users = HashMap::new();
        let index = StoredSoundIndex::from_sounds(vec![stored("boo")]);
        let mut table = SlotTable::new();
        table.reconcile(&[remote("A", "boo", "u1"), remote("B", "new", "u1")]);
        let ctx = RenderContext {
            presence: true,
            operator_id: "me",
            users: &users,
            stored: &index,
        };
        assert!(!slot_view(&ctx, 0, table.get(0).unwrap()).can_save);
        assert!(slot_view(&ctx, 1, table.get(1).unwrap()).can_save);
    }

    #[test]
    fn owner_details_prefer_the_user_cache() {
        let mut users = HashMap::new();
        users.insert(
            "u1".to_string(),
            UserInfo {
                username: "ann".to_string(),
                avatar: Some("cached".to_string()),
            },
        );
        let index = StoredSoundIndex::default();
        let mut table = SlotTable::new();
        table.reconcile(&[remote("A", "boo", "u1"), remote("B", "mine", "me")]);
        let ctx = RenderContext {
            presence: true,
            operator_id: "me",
            users: &users,
            stored: &index,
        };

        let view = slot_view(&ctx, 0, table.get(0).unwrap());
        assert_eq!(view.owner_name, "ann");
        assert_eq!(view.owner_avatar, Some("cached"));
        assert!(!view.owned_by_operator);

        let mine = slot_view(&ctx, 1, table.get(1).unwrap());
        assert_eq!(mine.owner_name, "me");
        assert!(mine.owned_by_operator);
    }

    #[test]
    fn rendering_is_deterministic() {
        let users = HashMap::new();
        let index = StoredSoundIndex::from_sounds(vec![stored("a"), stored("b")]);
        let mut table = SlotTable::new();
        table.reconcile(&[remote("A", "a", "u1")]);
        let ctx = RenderContext {
            presence: true,
            operator_id: "me",
            users: &users,
            stored: &index,
        };
        assert_eq!(render_board(&ctx, &table), render_board(&ctx, &table));
    }

    #[test]
    fn stored_panel_hides_sounds_on_the_board_and_blocks_adds_when_full() {
        let users = HashMap::new();
        let index = StoredSoundIndex::from_sounds(vec![stored("sound0"), stored("extra")]);
        let ctx = RenderContext {
            presence: false,
            operator_id: "me",
            users: &users,
            stored: &index,
        };

        let mut table = SlotTable::new();
        table.reconcile(&[remote("A", "sound0", "u1")]);
        let views = stored_views(&ctx, &table);
        let extra = views.iter().find(|v| v.sound.name == "extra").unwrap();
        let on_board = views.iter().find(|v| v.sound.name == "sound0").unwrap();
        assert!(on_board.on_soundboard && !on_board.can_add);
        assert!(extra.can_add);

        let remotes: Vec<RemoteSound> = (0..8)
            .map(|i| remote(&format!("id{i}"), &format!("sound{i}"), "u1"))
            .collect();
        table.reconcile(&remotes);
        let views = stored_views(&ctx, &table);
        assert!(views.iter().all(|v| !v.can_add));
    }
}

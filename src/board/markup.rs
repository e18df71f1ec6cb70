//! HTML fragments pushed to viewers. Each fragment carries a stable element
//! id so the client swaps it in place.

use std::fmt::Write;

use serde_json::json;

use super::render::{SlotView, StoredSoundView};

const CDN_URL: &str = "https://cdn.discordapp.com";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Keep only characters that are safe inside a quoted JS string and a CSS id.
fn script_ident(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

fn disabled(enabled: bool) -> &'static str {
    if enabled {
        ""
    } else {
        " disabled"
    }
}

pub fn slot_id(ordinal: usize) -> String {
    format!("slot-{ordinal}")
}

pub fn avatar_url(user_id: &str, avatar: Option<&str>) -> String {
    match avatar {
        Some(hash) => format!("{CDN_URL}/avatars/{user_id}/{hash}.png"),
        None => format!("{CDN_URL}/embed/avatars/0.png"),
    }
}

pub fn empty_slot(ordinal: usize) -> String {
    format!(
        r#"<div id="{}" class="droppable sound-slot empty" data-soundid=""><span class="slot-label">empty</span></div>"#,
        slot_id(ordinal)
    )
}

pub fn slot(view: &SlotView<'_>) -> String {
    let slot = view.slot;
    let sound_vals = escape(
        &json!({ "soundID": slot.sound_id, "ordinal": view.ordinal }).to_string(),
    );
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div id="{id}" class="droppable sound-slot" data-soundid="{sound_id}">"#,
        id = slot_id(view.ordinal),
        sound_id = escape(&slot.sound_id),
    );
    let _ = write!(
        out,
        r#"<h5 class="sound-name">{}</h5>"#,
        escape(&slot.name)
    );
    let _ = write!(
        out,
        r#"<div class="sound-owner"><img class="avatar" src="{src}" alt=""><span>{owner}</span></div>"#,
        src = escape(&avatar_url(&slot.owner_id, view.owner_avatar)),
        owner = escape(view.owner_name),
    );
    out.push_str(r#"<div class="sound-actions">"#);
    let _ = write!(
        out,
        r#"<button class="send-sound-btn" hx-post="/send-sound" hx-ext="json-enc" hx-vals="{sound_vals}" hx-swap="none"{}>play</button>"#,
        disabled(view.can_send),
    );
    if view.can_save {
        let save_vals = escape(&json!({ "soundID": slot.sound_id, "name": slot.name }).to_string());
        let _ = write!(
            out,
            r#"<button class="save-sound-btn" hx-post="/save-sound" hx-ext="json-enc" hx-vals="{save_vals}" hx-swap="none">save</button>"#
        );
    }
    if view.owned_by_operator {
        let delete_vals = escape(&json!({ "soundID": slot.sound_id }).to_string());
        let _ = write!(
            out,
            r#"<button class="delete-sound-btn" hx-post="/delete-sound" hx-ext="json-enc" hx-vals="{delete_vals}" hx-swap="none">remove</button>"#
        );
    }
    out.push_str("</div></div>");
    out
}

fn stored_card(view: &StoredSoundView<'_>) -> String {
    let sound = view.sound;
    let file_name = sound.file_name();
    let add_vals = escape(&json!({ "soundLocation": file_name }).to_string());
    let play_vals = escape(
        &json!({ "soundLocation": sound.name, "ordinal": format!("stored-{}", view.index) })
            .to_string(),
    );
    let hidden = if view.on_soundboard { " hidden" } else { "" };
    format!(
        concat!(
            r#"<div id="stored-{index}" class="add-sound-component{hidden}" draggable="true" "#,
            r#"data-soundname="{name}" data-soundext=".{ext}">"#,
            r#"<h5 class="sound-name">{name}</h5>"#,
            r#"<button class="add-sound-btn" hx-post="/add-sound" hx-ext="json-enc" hx-vals="{add_vals}" hx-swap="none"{add_disabled}>add</button>"#,
            r#"<button class="send-sound-btn" hx-get="/quickplay" hx-vals="{play_vals}" hx-swap="none"{send_disabled}>play</button>"#,
            "</div>"
        ),
        index = view.index,
        hidden = hidden,
        name = escape(&sound.name),
        ext = escape(&sound.extension),
        add_vals = add_vals,
        play_vals = play_vals,
        add_disabled = disabled(view.can_add),
        send_disabled = disabled(view.can_send),
    )
}

pub fn stored_panel(views: &[StoredSoundView<'_>]) -> String {
    let mut out = String::from(r#"<div id="storedsounds">"#);
    for view in views {
        out.push_str(&stored_card(view));
    }
    out.push_str("</div>");
    out
}

pub fn viewer_count(count: usize) -> String {
    format!(r#"<span id="user-count">{count}</span>"#)
}

/// Asks every viewer to play (and highlight) a sound that was just sent.
pub fn play_notice(element_id: &str, sound_id: &str) -> String {
    format!(
        r#"<div id="playsound"><script>window._playSound('{}','{}',true)</script></div>"#,
        script_ident(element_id),
        script_ident(sound_id)
    )
}

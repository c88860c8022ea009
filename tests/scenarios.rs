//! Literal end-to-end scenarios from the specification's testable
//! properties: each feeds a fixed sequence of server lines and asserts the
//! full resulting state, not just one field.

use slirc_state::{Casemapping, Line, Session};

fn feed(session: &mut Session, raw: &str) {
    let line = Line::parse(raw).expect("valid test line");
    session.parse_tokens(&line);
}

#[test]
fn welcome_and_isupport_set_nickname_and_casemap() {
    let mut session = Session::new("net");
    feed(&mut session, ":irc.example.com 001 nick :hi");
    feed(&mut session, ":irc.example.com 005 nick CASEMAPPING=ascii :are supported");

    assert_eq!(session.nickname(), "nick");
    assert_eq!(session.isupport().casemapping, Casemapping::Ascii);
}

#[test]
fn cap_ls_continuation_merges_before_promoting() {
    let mut session = Session::new("net");
    feed(&mut session, "CAP * LS * :a b");
    feed(&mut session, "CAP * LS :c");

    let caps = session.caps().expect("caps promoted after terminal LS");
    assert_eq!(caps.len(), 3);
    for key in ["a", "b", "c"] {
        assert_eq!(caps.get(key), Some(&None));
    }
}

#[test]
fn cap_ls_single_line_with_values() {
    let mut session = Session::new("net");
    feed(&mut session, "CAP * LS :a b= c=1");

    let caps = session.caps().unwrap();
    assert_eq!(caps.get("a"), Some(&None));
    assert_eq!(caps.get("b"), Some(&None));
    assert_eq!(caps.get("c"), Some(&Some("1".to_string())));
}

#[test]
fn join_and_names_build_channel_and_roster() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");
    feed(&mut session, ":irc.example.com 353 me = #ch :@me +bob");

    assert!(session.has_channel("#ch"));
    let channel_lower = session.casefold("#ch");
    let me_lower = session.casefold("me");
    let bob_lower = session.casefold("bob");

    let roster = &session.channel_users()[&channel_lower];
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[&me_lower].modes, vec!['o']);
    assert_eq!(roster[&bob_lower].modes, vec!['v']);

    assert!(session.users().contains_key(&me_lower));
    assert!(session.users().contains_key(&bob_lower));
    assert_eq!(session.user_channels()[&me_lower], [channel_lower.clone()].into());
    assert_eq!(session.user_channels()[&bob_lower], [channel_lower].into());
}

#[test]
fn self_part_empties_every_index() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");
    feed(&mut session, ":irc.example.com 353 me = #ch :@me +bob");
    feed(&mut session, ":me!u@h PART #ch :bye");

    assert!(session.channels().is_empty());
    assert!(session.users().is_empty());
    assert!(session.user_channels().is_empty());
    assert!(session.channel_users().is_empty());
}

#[test]
fn nick_change_rekeys_local_identity_and_user_map() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");
    feed(&mut session, ":me!u@h NICK :me2");

    let me2_lower = session.casefold("me2");
    assert_eq!(session.nickname(), "me2");
    assert!(session.users().contains_key(&me2_lower));
    assert!(!session.users().contains_key(&session.casefold("me")));
}

#[test]
fn cap_ack_one_line_preserves_wire_order() {
    let mut session = Session::new("net");
    feed(&mut session, "CAP * LS :a b");
    feed(&mut session, "CAP * ACK :a b");

    assert_eq!(session.agreed_caps(), &["a".to_string(), "b".to_string()]);
}

#[test]
fn cap_ack_two_lines_preserves_wire_order() {
    let mut session = Session::new("net");
    feed(&mut session, "CAP * LS :a b c");
    feed(&mut session, "CAP * ACK * :a b");
    feed(&mut session, "CAP * ACK :c");

    assert_eq!(
        session.agreed_caps(),
        &["a".to_string(), "b".to_string(), "c".to_string()]
    );
}

#[test]
fn cap_ack_then_del_leaves_surviving_capability() {
    let mut session = Session::new("net");
    feed(&mut session, "CAP * LS :a b");
    feed(&mut session, "CAP * ACK :a b");
    feed(&mut session, "CAP * DEL :a");

    let caps = session.caps().unwrap();
    assert!(!caps.contains_key("a"));
    assert_eq!(caps.get("b"), Some(&None));
    assert_eq!(session.agreed_caps(), &["b".to_string()]);
}

#[test]
fn self_quit_clears_all_state() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");
    feed(&mut session, ":irc.example.com 353 me = #ch :@me +bob");
    feed(&mut session, ":me!u@h QUIT :goodbye");

    assert!(session.channels().is_empty());
    assert!(session.users().is_empty());
    assert!(session.user_channels().is_empty());
    assert!(session.channel_users().is_empty());
}

#[test]
fn error_line_also_clears_all_state() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");
    feed(&mut session, ":irc.example.com ERROR :Closing link");

    assert!(session.channels().is_empty());
    assert!(session.users().is_empty());
}

#[test]
fn kick_removes_only_the_kicked_member() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");
    feed(&mut session, ":irc.example.com 353 me = #ch :me bob");
    feed(&mut session, ":op!u@h KICK #ch bob :spamming");

    assert!(session.has_channel("#ch"));
    assert!(!session.has_user("bob"));
    assert!(session.has_user("me"));
    let channel_lower = session.casefold("#ch");
    assert!(!session.channel_users()[&channel_lower].contains_key(&session.casefold("bob")));
}

#[test]
fn mode_updates_prefix_and_list_modes() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");
    feed(&mut session, ":irc.example.com 005 me CHANMODES=b,k,l,imnt :are supported");
    feed(&mut session, ":irc.example.com 353 me = #ch :me bob");
    feed(&mut session, ":op!u@h MODE #ch +ob bob *!*@bad.host");

    let channel_lower = session.casefold("#ch");
    let bob_lower = session.casefold("bob");
    let roster = &session.channel_users()[&channel_lower];
    assert_eq!(roster[&bob_lower].modes, vec!['o']);

    let channel = session.get_channel("#ch").unwrap();
    match channel.params.get(&'b') {
        Some(slirc_state::ModeValue::List(values)) => {
            assert_eq!(values, &vec!["*!*@bad.host".to_string()]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn privmsg_emits_text_source_and_target() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");
    feed(&mut session, ":me!u@h JOIN #ch");

    let line = Line::parse(":bob!u@h PRIVMSG #ch :hello there").unwrap();
    let batches = session.parse_tokens(&line);
    assert_eq!(batches.len(), 1);
    let emits = &batches[0];

    assert_eq!(emits[0], slirc_state::Emit::Command("PRIVMSG".to_string()));
    assert!(emits.iter().any(|e| matches!(e, slirc_state::Emit::Text(t) if t == "hello there")));
    assert!(emits
        .iter()
        .any(|e| matches!(e, slirc_state::Emit::SourceUser(u) if u.nickname == "bob")));
    assert!(emits.iter().any(|e| matches!(e, slirc_state::Emit::Channel(_))));
}

#[test]
fn privmsg_to_self_emits_target_self() {
    let mut session = Session::new("net");
    feed(&mut session, ":me!u@h 001 me :x");

    let line = Line::parse(":bob!u@h PRIVMSG me :hi there").unwrap();
    let batches = session.parse_tokens(&line);
    let emits = &batches[0];
    assert!(emits.iter().any(|e| matches!(e, slirc_state::Emit::TargetSelf)));
}

#[test]
fn motd_accumulates_between_375_and_376_boundaries() {
    let mut session = Session::new("net");
    feed(&mut session, ":irc.example.com 375 me :- MOTD -");
    feed(&mut session, ":irc.example.com 372 me :line one");
    feed(&mut session, ":irc.example.com 372 me :line two");

    // 375 itself is double-registered (clear + append), so its own text
    // also lands in the buffer ahead of the two 372 lines.
    assert_eq!(session.motd(), ["- MOTD -", "line one", "line two"]);
}

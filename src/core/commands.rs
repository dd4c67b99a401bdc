// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Translates framed text commands into manager calls. Every command runs
//! to completion under the manager lock, so compound operations observe a
//! consistent registry.

use std::sync::Mutex;

use crate::core::error::{Result, VoldError};
use crate::core::events::{
    errno_to_response, ARGUMENT_MISMATCH, COMMAND_OKAY, COMMAND_SYNTAX_ERROR, OPERATION_FAILED,
};
use crate::core::manager::VolumeManager;

/// Splits a command line into argv, honouring double quotes and backslash
/// escapes. `None` when a quote never closes.
pub fn tokenize(line: &str) -> Option<Vec<String>> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut pending = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            pending = true;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            ' ' if !in_quotes => {
                if pending {
                    argv.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            _ => {
                current.push(c);
                pending = true;
            }
        }
    }

    if in_quotes || escaped {
        return None;
    }
    if pending {
        argv.push(current);
    }
    Some(argv)
}

/// Runs one argv-style command and produces the `(code, text)` response.
pub fn dispatch(vm: &Mutex<VolumeManager>, argv: &[String]) -> (u32, String) {
    let Some(subsystem) = argv.first() else {
        return (COMMAND_SYNTAX_ERROR, "Missing Argument".to_owned());
    };

    let mut vm = vm.lock().unwrap();
    match subsystem.as_str() {
        "volume" => volume_cmd(&mut vm, &argv[1..]),
        "loop" => loop_cmd(&mut vm, &argv[1..]),
        _ => (COMMAND_SYNTAX_ERROR, "Unknown command".to_owned()),
    }
}

fn ok_fail(res: Result<()>) -> (u32, String) {
    match res {
        Ok(()) => (COMMAND_OKAY, "Command succeeded".to_owned()),
        Err(VoldError::Syntax(msg)) => (COMMAND_SYNTAX_ERROR, msg),
        Err(e) => (OPERATION_FAILED, format!("Operation failed: {}", e)),
    }
}

fn volume_cmd(vm: &mut VolumeManager, args: &[String]) -> (u32, String) {
    let Some(verb) = args.first() else {
        return (COMMAND_SYNTAX_ERROR, "Missing Argument".to_owned());
    };

    match verb.as_str() {
        "reset" => ok_fail(vm.reset()),
        "shutdown" => ok_fail(vm.shutdown()),
        "debug" => {
            vm.set_debug(true);
            (COMMAND_OKAY, "Command succeeded".to_owned())
        }
        "mkdirs" => {
            let Some(path) = args.get(1) else {
                return (ARGUMENT_MISMATCH, "Argument mismatch".to_owned());
            };
            ok_fail(vm.mkdirs(path))
        }
        "mount" => {
            // mount <volId> [flags] [user]
            let Some(id) = args.get(1) else {
                return (ARGUMENT_MISMATCH, "Argument mismatch".to_owned());
            };
            let flags = args.get(2).and_then(|f| f.parse().ok()).unwrap_or(0);
            let user_id = args.get(3).and_then(|u| u.parse().ok()).unwrap_or(-1);
            ok_fail(vm.mount_volume(id, flags, user_id))
        }
        "unmount" => {
            let Some(id) = args.get(1) else {
                return (ARGUMENT_MISMATCH, "Argument mismatch".to_owned());
            };
            ok_fail(vm.unmount_volume(id))
        }
        "format" => {
            // format <volId> <fsType|auto>
            let (Some(id), Some(fs_type)) = (args.get(1), args.get(2)) else {
                return (ARGUMENT_MISMATCH, "Argument mismatch".to_owned());
            };
            ok_fail(vm.format_volume(id, fs_type))
        }
        _ => (COMMAND_SYNTAX_ERROR, "Unknown command".to_owned()),
    }
}

#[cfg(feature = "virtual_cdrom")]
fn loop_cmd(vm: &mut VolumeManager, args: &[String]) -> (u32, String) {
    let Some(verb) = args.first() else {
        return (COMMAND_SYNTAX_ERROR, "Missing Argument".to_owned());
    };

    let res = match verb.as_str() {
        "mount" => {
            let Some(path) = args.get(1) else {
                return (COMMAND_SYNTAX_ERROR, "Usage: loop mount <path>".to_owned());
            };
            if args.len() > 2 {
                return (COMMAND_SYNTAX_ERROR, "Usage: loop mount <path>".to_owned());
            }
            vm.mount_loop(path)
        }
        "unmount" => {
            if args.len() > 2 {
                return (
                    COMMAND_SYNTAX_ERROR,
                    "Usage: loop unmount [force]".to_owned(),
                );
            }
            let force = args.get(1).is_some_and(|a| a == "force");
            vm.unmount_loop(force)
        }
        _ => return (COMMAND_SYNTAX_ERROR, "Unknown loop cmd".to_owned()),
    };

    match res {
        Ok(()) => (COMMAND_OKAY, "loop operation succeeded".to_owned()),
        Err(e) => (errno_to_response(e.errno()), "loop operation failed".to_owned()),
    }
}

#[cfg(not(feature = "virtual_cdrom"))]
fn loop_cmd(_vm: &mut VolumeManager, _args: &[String]) -> (u32, String) {
    (COMMAND_SYNTAX_ERROR, "Unknown command".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::OPERATION_FAILED_NO_MEDIA;
    use crate::core::tests::{test_context, RecordingBroadcaster, ScriptedExec};
    use std::sync::Arc;

    fn test_manager() -> Mutex<VolumeManager> {
        let ctx = test_context(
            Arc::new(ScriptedExec::default()),
            Arc::new(RecordingBroadcaster::default()),
        );
        Mutex::new(VolumeManager::new(ctx))
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokenize_plain_and_quoted() {
        assert_eq!(
            tokenize("volume mount public:8,17 0 -1").unwrap(),
            argv(&["volume", "mount", "public:8,17", "0", "-1"])
        );
        assert_eq!(
            tokenize(r#"volume mkdirs "/mnt/media_rw/UUID/My Files""#).unwrap(),
            argv(&["volume", "mkdirs", "/mnt/media_rw/UUID/My Files"])
        );
        assert_eq!(
            tokenize(r#"a b\ c"#).unwrap(),
            argv(&["a", "b c"])
        );
        assert_eq!(tokenize("  spaced   out  ").unwrap(), argv(&["spaced", "out"]));
        assert_eq!(tokenize(r#"empty """#).unwrap(), argv(&["empty", ""]));
    }

    #[test]
    fn tokenize_rejects_unterminated_quote() {
        assert!(tokenize(r#"volume mkdirs "/mnt/unfinished"#).is_none());
    }

    #[test]
    fn reset_succeeds() {
        let vm = test_manager();
        let (code, text) = dispatch(&vm, &argv(&["volume", "reset"]));
        assert_eq!(code, COMMAND_OKAY);
        assert_eq!(text, "Command succeeded");
    }

    #[test]
    fn unknown_subsystem_and_verb() {
        let vm = test_manager();
        assert_eq!(dispatch(&vm, &argv(&["cryptfs", "status"])).0, COMMAND_SYNTAX_ERROR);
        assert_eq!(dispatch(&vm, &argv(&["volume", "fly"])).0, COMMAND_SYNTAX_ERROR);
        assert_eq!(dispatch(&vm, &[]).0, COMMAND_SYNTAX_ERROR);
    }

    #[test]
    fn mount_unknown_volume_reports_syntax_error() {
        let vm = test_manager();
        let (code, _) = dispatch(&vm, &argv(&["volume", "mount", "public:8,17", "0", "-1"]));
        assert_eq!(code, COMMAND_SYNTAX_ERROR);
    }

    #[test]
    fn missing_arguments_mismatch() {
        let vm = test_manager();
        assert_eq!(dispatch(&vm, &argv(&["volume", "mount"])).0, ARGUMENT_MISMATCH);
        assert_eq!(dispatch(&vm, &argv(&["volume", "format", "x"])).0, ARGUMENT_MISMATCH);
        assert_eq!(dispatch(&vm, &argv(&["volume", "mkdirs"])).0, ARGUMENT_MISMATCH);
    }

    #[test]
    fn debug_toggles() {
        let vm = test_manager();
        assert_eq!(dispatch(&vm, &argv(&["volume", "debug"])).0, COMMAND_OKAY);
    }

    #[cfg(feature = "virtual_cdrom")]
    #[test]
    fn loop_unmount_without_slot_reports_no_media() {
        let vm = test_manager();
        let (code, _) = dispatch(&vm, &argv(&["loop", "unmount"]));
        assert_eq!(code, OPERATION_FAILED_NO_MEDIA);
    }

    #[cfg(feature = "virtual_cdrom")]
    #[test]
    fn loop_mount_usage() {
        let vm = test_manager();
        assert_eq!(dispatch(&vm, &argv(&["loop", "mount"])).0, COMMAND_SYNTAX_ERROR);
    }
}

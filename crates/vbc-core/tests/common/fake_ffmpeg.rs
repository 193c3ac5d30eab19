//! Shell scripts standing in for the ffmpeg binary.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const VERSION_PROBE: &str = r#"if [ "$1" = "-version" ]; then
  echo "ffmpeg version 6.1-fake Copyright (c) 2000-2023 the FFmpeg developers"
  echo "built with fake-cc"
  exit 0
fi
for arg; do out="$arg"; done
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Reports progress to stderr, writes the last argument, exits 0.
pub fn converting(dir: &Path) -> PathBuf {
    let body = format!(
        "{}{}",
        VERSION_PROBE,
        r#"printf 'Input #0, avi, from input:\n  Duration: 00:00:04.00, start: 0.000000, bitrate: 900 kb/s\n' >&2
printf 'frame=   50 fps= 25 q=28.0 size=      64kB time=00:00:02.00 bitrate= 262.1kbits/s speed=1.00x\r' >&2
sleep 0.05
printf 'frame=  100 fps= 25 q=28.0 size=     128kB time=00:00:04.00 bitrate= 262.1kbits/s speed=1.00x\n' >&2
echo converted > "$out"
exit 0
"#
    );
    write_script(dir, "ffmpeg-ok", &body)
}

/// Prints an ffmpeg-style error and exits 1.
pub fn failing(dir: &Path) -> PathBuf {
    let body = format!(
        "{}{}",
        VERSION_PROBE,
        r#"echo 'input.avi: Invalid data found when processing input' >&2
exit 1
"#
    );
    write_script(dir, "ffmpeg-fail", &body)
}

/// Reports one stats line and then sleeps until signalled.
pub fn hanging(dir: &Path) -> PathBuf {
    let body = format!(
        "{}{}",
        VERSION_PROBE,
        r#"printf '  Duration: 00:01:00.00, start: 0.000000, bitrate: 900 kb/s\n' >&2
printf 'frame=1 fps=1 time=00:00:01.00 bitrate=1.0kbits/s speed=1.00x\n' >&2
exec sleep 30
"#
    );
    write_script(dir, "ffmpeg-hang", &body)
}

/// Ignores SIGTERM; only SIGKILL stops it.
pub fn stubborn(dir: &Path) -> PathBuf {
    let body = format!(
        "{}{}",
        VERSION_PROBE,
        r#"trap '' TERM
printf 'frame=1 fps=1 time=00:00:01.00 bitrate=1.0kbits/s speed=1.00x\n' >&2
while :; do sleep 1; done
"#
    );
    write_script(dir, "ffmpeg-stubborn", &body)
}

/// Never answers the version probe.
pub fn slow_probe(dir: &Path) -> PathBuf {
    write_script(dir, "ffmpeg-slow", "sleep 5\n")
}

/// Fails the version probe with exit code 3.
pub fn broken_probe(dir: &Path) -> PathBuf {
    write_script(dir, "ffmpeg-broken", "echo 'error while loading shared libraries' >&2\nexit 3\n")
}

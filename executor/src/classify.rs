//! Static binary classification tables (§4.5).
//!
//! Grounded on the source's `AgentExecutor.BINARY_CAPABILITIES` and
//! `NETWORK_COMMANDS`. Binaries absent from [`binary_capability`] are
//! permitted with no specific capability check; binaries absent from
//! [`is_network_binary`] are not subject to the network policy at all.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

/// `(binary basename, required capability tag)` pairs.
const BINARY_CAPABILITIES: &[(&str, &str)] = &[
    // Package management
    ("pkg", "exec.pkg"),
    ("apt", "exec.pkg"),
    ("apt-get", "exec.pkg"),
    ("apt-cache", "exec.pkg"),
    ("dpkg", "exec.pkg"),
    ("dpkg-deb", "exec.pkg"),
    // Git
    ("git", "exec.git"),
    // QEMU
    ("qemu-system-x86_64", "exec.qemu"),
    ("qemu-system-aarch64", "exec.qemu"),
    ("qemu-system-arm", "exec.qemu"),
    ("qemu-img", "exec.qemu"),
    // ISO tools
    ("xorriso", "exec.iso"),
    ("mkisofs", "exec.iso"),
    ("isoinfo", "exec.iso"),
    ("genisoimage", "exec.iso"),
    // APK tools
    ("apktool", "exec.apk"),
    ("jadx", "exec.apk"),
    ("aapt", "exec.apk"),
    ("aapt2", "exec.apk"),
    ("zipalign", "exec.apk"),
    ("apksigner", "exec.apk"),
    // Docker
    ("docker", "exec.docker"),
    ("podman", "exec.docker"),
    // Shell
    ("bash", "exec.shell"),
    ("sh", "exec.shell"),
    ("zsh", "exec.shell"),
    // Python
    ("python", "exec.python"),
    ("python3", "exec.python"),
    ("pip", "exec.python"),
    ("pip3", "exec.python"),
    // Build tools
    ("make", "exec.build"),
    ("cmake", "exec.build"),
    ("gradle", "exec.build"),
    ("gradlew", "exec.build"),
    ("ninja", "exec.build"),
    ("meson", "exec.build"),
    // Analysis tools
    ("binwalk", "exec.analyze"),
    ("file", "exec.analyze"),
    ("strings", "exec.analyze"),
    ("hexdump", "exec.analyze"),
    ("objdump", "exec.analyze"),
    ("readelf", "exec.analyze"),
    ("nm", "exec.analyze"),
    ("ldd", "exec.analyze"),
    // Compression
    ("tar", "exec.compress"),
    ("gzip", "exec.compress"),
    ("bzip2", "exec.compress"),
    ("xz", "exec.compress"),
    ("zip", "exec.compress"),
    ("unzip", "exec.compress"),
    ("7z", "exec.compress"),
];

const NETWORK_COMMANDS: &[&str] = &[
    "curl", "wget", "ssh", "scp", "rsync", "nc", "netcat", "ping", "traceroute", "nmap", "telnet",
    "ftp", "sftp",
];

fn network_commands() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| NETWORK_COMMANDS.iter().copied().collect())
}

/// The basename of a command, the way the source strips a leading path
/// before table lookup (`os.path.basename`).
pub fn basename(binary: &str) -> &str {
    Path::new(binary)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(binary)
}

/// The capability tag required to run `binary`, if any.
pub fn binary_capability(binary: &str) -> Option<&'static str> {
    let name = basename(binary);
    BINARY_CAPABILITIES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, cap)| *cap)
}

/// Whether `binary` is subject to the network policy in §4.1.
pub fn is_network_binary(binary: &str) -> bool {
    network_commands().contains(basename(binary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_before_lookup() {
        assert_eq!(binary_capability("/usr/bin/git"), Some("exec.git"));
        assert_eq!(binary_capability("git"), Some("exec.git"));
    }

    #[test]
    fn unlisted_binary_requires_no_capability() {
        assert_eq!(binary_capability("echo"), None);
    }

    #[test]
    fn network_binary_recognized_regardless_of_path() {
        assert!(is_network_binary("/usr/bin/curl"));
        assert!(!is_network_binary("git"));
    }
}

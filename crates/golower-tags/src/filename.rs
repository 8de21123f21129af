//! Platform constraints implied by file names (`x_linux.go`, `x_js_wasm.go`).

use crate::TagSet;

pub const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

pub const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "ecmascript", "loong64",
    "mips", "mipsle", "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64",
    "ppc64le", "riscv", "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

/// Whether a file name's `_GOOS`, `_GOARCH` or `_GOOS_GOARCH` suffix (before
/// an optional `_test`) is compatible with `tags`.
pub fn good_os_arch_file(name: &str, tags: &TagSet) -> bool {
    let stem = match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    };
    // The part before the first underscore never constrains anything.
    let Some(first) = stem.find('_') else {
        return true;
    };
    let stem = &stem[first..];
    let stem = stem.strip_suffix("_test").unwrap_or(stem);

    let parts: Vec<&str> = stem.split('_').collect();
    let n = parts.len();
    if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
        return tags.has(parts[n - 2]) && tags.has(parts[n - 1]);
    }
    if n >= 1 && (KNOWN_OS.contains(&parts[n - 1]) || KNOWN_ARCH.contains(&parts[n - 1])) {
        return tags.has(parts[n - 1]);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js() -> TagSet {
        TagSet::with_platform("js", "ecmascript", std::iter::empty::<String>())
    }

    #[test]
    fn test_unconstrained_names() {
        assert!(good_os_arch_file("fmt.go", &js()));
        assert!(good_os_arch_file("print_test.go", &js()));
        assert!(good_os_arch_file("linux.go", &js()));
        assert!(good_os_arch_file("format_helpers.go", &js()));
    }

    #[test]
    fn test_os_suffix() {
        assert!(good_os_arch_file("zerrors_js.go", &js()));
        assert!(!good_os_arch_file("zerrors_linux.go", &js()));
        assert!(!good_os_arch_file("zerrors_linux_test.go", &js()));
        // nacl is implied by js
        assert!(good_os_arch_file("time_nacl.go", &js()));
    }

    #[test]
    fn test_arch_and_pair_suffix() {
        assert!(!good_os_arch_file("asm_amd64.go", &js()));
        assert!(good_os_arch_file("sys_ecmascript.go", &js()));
        assert!(!good_os_arch_file("sys_js_wasm.go", &js()));
        assert!(good_os_arch_file("sys_js_ecmascript.go", &js()));
    }
}

//! Overlay merging.
//!
//! An overlay is a set of Go files for the same package whose declarations
//! patch the original ones by name. Each overlay declaration carries one
//! patch kind (see [`Directive`]); an undecorated declaration replaces.
//!
//! ```text
//! original:  func Now() Time { ... nanotime() ... }
//! overlay:   //golower:keep-original
//!            func Now() Time { t := _golower_original_Now(); ... }
//! merged:    func _golower_original_Now() Time { ... }
//!            func Now() Time { t := _golower_original_Now(); ... }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use golower_syntax::visit::referenced_qualifiers;
use golower_syntax::{Decl, Directive, File, FuncDecl, ImportSpec, Pos, ValueSpec};

/// Prefix given to originals kept under [`Directive::KeepOriginal`].
pub const ORIGINAL_PREFIX: &str = "_golower_original_";

/// How an overlay declaration patches the original of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Replace,
    Purge,
    KeepOriginal,
    OverrideSignature,
}

impl PatchKind {
    fn of(directives: &[Directive]) -> Self {
        directives
            .iter()
            .find_map(|d| match d {
                Directive::Replace => Some(PatchKind::Replace),
                Directive::Purge => Some(PatchKind::Purge),
                Directive::KeepOriginal => Some(PatchKind::KeepOriginal),
                Directive::OverrideSignature => Some(PatchKind::OverrideSignature),
                Directive::Blocking => None,
            })
            .unwrap_or(PatchKind::Replace)
    }
}

/// A declaration location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub file: String,
    pub pos: Pos,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.pos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("{second}: overlay declaration of {key} conflicts with {first}")]
    Conflict { key: String, first: Site, second: Site },

    #[error("{site}: override-signature applies to functions only, not {key}")]
    SignatureOfNonFunction { key: String, site: Site },

    #[error("{site}: overlay file is package {found}, expected {expected}")]
    PackageMismatch {
        site: Site,
        expected: String,
        found: String,
    },
}

/// A function whose original was substituted by a REPLACE patch. The
/// signature check happens during type checking.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacedDecl {
    pub key: String,
    pub original: FuncDecl,
    pub original_site: Site,
    /// Imports of the original's file, for resolving its signature.
    pub original_imports: Vec<ImportSpec>,
    pub replacement_site: Site,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedPackage {
    /// Patched original files followed by the overlay files.
    pub files: Vec<File>,
    pub replaced: Vec<ReplacedDecl>,
}

struct Patch {
    kind: PatchKind,
    site: Site,
    /// For OVERRIDE-SIGNATURE: the overlay function supplying the signature.
    signature_from: Option<FuncDecl>,
}

/// Patch keys of a declaration: `Name` or `Recv.Name`. `init` and `_` never
/// take part in patching.
fn decl_keys(decl: &Decl) -> Vec<String> {
    match decl {
        Decl::Func(f) if f.recv.is_none() && f.name == "init" => Vec::new(),
        Decl::Func(f) => vec![f.key()],
        other => other
            .names()
            .into_iter()
            .filter(|n| *n != "_")
            .map(str::to_string)
            .collect(),
    }
}

/// Merge `overlay` files onto `original` files of the same package.
pub fn merge(original: Vec<File>, overlay: Vec<File>) -> Result<MergedPackage, MergeError> {
    if overlay.is_empty() {
        return Ok(MergedPackage {
            files: original,
            replaced: Vec::new(),
        });
    }

    let patches = collect_patches(&original, &overlay)?;
    let purged_types: BTreeSet<&str> = patches
        .iter()
        .filter(|(key, p)| p.kind == PatchKind::Purge && !key.contains('.'))
        .map(|(key, _)| key.as_str())
        .collect();

    let mut replaced = Vec::new();
    let mut files = Vec::with_capacity(original.len() + overlay.len());
    for mut file in original {
        let decls = std::mem::take(&mut file.decls);
        for decl in decls {
            if let Some(decl) = apply(decl, &file, &patches, &purged_types, &mut replaced) {
                file.decls.push(decl);
            }
        }
        prune_imports(&mut file);
        files.push(file);
    }

    for mut file in overlay {
        file.decls.retain(|d| {
            !matches!(
                PatchKind::of(d.directives()),
                PatchKind::Purge | PatchKind::OverrideSignature
            )
        });
        prune_imports(&mut file);
        files.push(file);
    }

    Ok(MergedPackage { files, replaced })
}

fn collect_patches(original: &[File], overlay: &[File]) -> Result<HashMap<String, Patch>, MergeError> {
    let package = original.first().map(|f| f.package.as_str());
    let mut patches: HashMap<String, Patch> = HashMap::new();
    for file in overlay {
        if let Some(expected) = package
            && file.package != expected
        {
            return Err(MergeError::PackageMismatch {
                site: Site {
                    file: file.path.clone(),
                    pos: Pos::new(1, 1),
                },
                expected: expected.to_string(),
                found: file.package.clone(),
            });
        }
        for decl in &file.decls {
            let kind = PatchKind::of(decl.directives());
            let site = Site {
                file: file.path.clone(),
                pos: decl.pos(),
            };
            if kind == PatchKind::OverrideSignature && !matches!(decl, Decl::Func(_)) {
                return Err(MergeError::SignatureOfNonFunction {
                    key: decl_keys(decl).join(", "),
                    site,
                });
            }
            for key in decl_keys(decl) {
                if let Some(first) = patches.get(&key) {
                    return Err(MergeError::Conflict {
                        key,
                        first: first.site.clone(),
                        second: site,
                    });
                }
                let signature_from = match (kind, decl) {
                    (PatchKind::OverrideSignature, Decl::Func(f)) => Some(f.clone()),
                    _ => None,
                };
                patches.insert(
                    key,
                    Patch {
                        kind,
                        site: site.clone(),
                        signature_from,
                    },
                );
            }
        }
    }
    Ok(patches)
}

/// Patch one original declaration. `None` drops it.
fn apply(
    decl: Decl,
    file: &File,
    patches: &HashMap<String, Patch>,
    purged_types: &BTreeSet<&str>,
    replaced: &mut Vec<ReplacedDecl>,
) -> Option<Decl> {
    match decl {
        Decl::Func(mut f) => {
            if let Some(recv) = &f.recv
                && purged_types.contains(recv.type_name.as_str())
            {
                tracing::debug!(method = %f.key(), "dropping method of purged type");
                return None;
            }
            let key = f.key();
            let Some(patch) = patches.get(&key) else {
                return Some(Decl::Func(f));
            };
            match patch.kind {
                PatchKind::Purge => None,
                PatchKind::Replace => {
                    replaced.push(ReplacedDecl {
                        key,
                        original_site: Site {
                            file: file.path.clone(),
                            pos: f.pos,
                        },
                        original: f,
                        original_imports: file.imports.clone(),
                        replacement_site: patch.site.clone(),
                    });
                    None
                }
                PatchKind::KeepOriginal => {
                    f.name = format!("{ORIGINAL_PREFIX}{}", f.name);
                    Some(Decl::Func(f))
                }
                PatchKind::OverrideSignature => {
                    if let Some(overlay) = &patch.signature_from {
                        f.recv = overlay.recv.clone();
                        f.type_params = overlay.type_params.clone();
                        f.sig = overlay.sig.clone();
                    }
                    Some(Decl::Func(f))
                }
            }
        }
        Decl::Type(mut t) => match patches.get(&t.name).map(|p| p.kind) {
            None => Some(Decl::Type(t)),
            Some(PatchKind::KeepOriginal) => {
                t.name = format!("{ORIGINAL_PREFIX}{}", t.name);
                Some(Decl::Type(t))
            }
            Some(_) => None,
        },
        Decl::Var(spec) => patch_values(spec, patches).map(Decl::Var),
        Decl::Const(spec) => patch_values(spec, patches).map(Decl::Const),
    }
}

/// Remove or rename patched names of a value spec.
///
/// A single patched name becomes `_` so the initializer still runs. Several
/// names with one value each lose the patched name and its value.
fn patch_values(mut spec: ValueSpec, patches: &HashMap<String, Patch>) -> Option<ValueSpec> {
    let kinds: Vec<Option<PatchKind>> = spec
        .names
        .iter()
        .map(|n| patches.get(n).map(|p| p.kind))
        .collect();
    if kinds.iter().all(Option::is_none) {
        return Some(spec);
    }
    let parallel = spec.values.len() == spec.names.len();
    if spec.names.len() == 1 || !parallel {
        for (name, kind) in spec.names.iter_mut().zip(&kinds) {
            match kind {
                Some(PatchKind::KeepOriginal) => *name = format!("{ORIGINAL_PREFIX}{name}"),
                Some(_) => *name = "_".to_string(),
                None => {}
            }
        }
        if spec.values.is_empty() && spec.names.iter().all(|n| n == "_") {
            return None;
        }
        return Some(spec);
    }

    let names = std::mem::take(&mut spec.names);
    let values = std::mem::take(&mut spec.values);
    for ((name, value), kind) in names.into_iter().zip(values).zip(kinds) {
        match kind {
            None => {
                spec.names.push(name);
                spec.values.push(value);
            }
            Some(PatchKind::KeepOriginal) => {
                spec.names.push(format!("{ORIGINAL_PREFIX}{name}"));
                spec.values.push(value);
            }
            Some(_) => {}
        }
    }
    if spec.names.is_empty() {
        None
    } else {
        Some(spec)
    }
}

/// Drop imports whose package name no longer appears in the file.
fn prune_imports(file: &mut File) {
    let used = referenced_qualifiers(&file.decls);
    file.imports.retain(|import| {
        let name = import.local_name();
        let keep = name == "_" || name == "." || used.contains(&name);
        if !keep {
            tracing::debug!(file = %file.path, import = %import.path, "pruning unused import");
        }
        keep
    });
}

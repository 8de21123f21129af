use std::rc::Rc;

use golower_syntax::File;

use crate::error::TypeErrors;
use crate::package::{ExportData, TypedPackage};

/// Supplies export data for the imports of a package being checked.
///
/// Implementations are expected to memoise, and to build a dependency on
/// demand when it has not been checked yet.
pub trait Importer {
    fn import(&mut self, path: &str) -> Result<Rc<ExportData>, String>;
}

/// Name resolution and type inference for one package.
pub trait TypeOracle {
    fn check(
        &self,
        path: &str,
        files: &[File],
        importer: &mut dyn Importer,
    ) -> Result<TypedPackage, TypeErrors>;
}

/// An importer over a fixed set of packages.
#[derive(Debug, Default)]
pub struct MapImporter {
    packages: std::collections::HashMap<String, Rc<ExportData>>,
}

impl MapImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, data: ExportData) {
        self.packages.insert(data.path.clone(), Rc::new(data));
    }
}

impl Importer for MapImporter {
    fn import(&mut self, path: &str) -> Result<Rc<ExportData>, String> {
        self.packages
            .get(path)
            .cloned()
            .ok_or_else(|| format!("package {path} not found"))
    }
}

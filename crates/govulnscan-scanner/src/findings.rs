//! Finding constructors shared by the source and binary drivers

use govulnscan_core::{Finding, Frame, Platform};
use govulnscan_graph::{Module, STDLIB_MODULE_PATH};
use govulnscan_osv::Entry;

use crate::affecting::applicable_packages;

pub(crate) fn module_finding(entry: &Entry, module: &Module, platform: &Platform) -> Finding {
    let mut frame = Frame {
        module: module.path.clone(),
        version: module.version.clone(),
        ..Frame::default()
    };
    // Standard-library findings name the affected package even at module
    // precision; the synthetic module path alone says nothing actionable.
    if module.path == STDLIB_MODULE_PATH {
        frame.package = applicable_packages(entry, &module.path, platform)
            .first()
            .map(|pkg| pkg.path.clone());
    }
    Finding {
        osv: entry.id.clone(),
        fixed_version: govulnscan_osv::latest_fixed(&entry.affected, &module.path),
        trace: vec![frame],
    }
}

pub(crate) fn package_finding(entry: &Entry, module: &Module, package: &str) -> Finding {
    Finding {
        osv: entry.id.clone(),
        fixed_version: govulnscan_osv::latest_fixed(&entry.affected, &module.path),
        trace: vec![Frame {
            module: module.path.clone(),
            version: module.version.clone(),
            package: Some(package.to_string()),
            ..Frame::default()
        }],
    }
}

//! `testboard check-schema` -- parse and compile a definition file.

use std::path::Path;

use testboard_schema::SchemaRegistry;

/// Report each kind's compile result. Returns false on a load error or any
/// unknown type.
pub(crate) async fn cmd_check_schema(file: &Path) -> bool {
    let registry = match SchemaRegistry::open(file).await {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("error: {}", e);
            return false;
        }
    };
    let active = registry.current();
    let failures = active.failures();

    for (kind, fields) in active.definition().iter() {
        let kind_failures: Vec<_> = failures.iter().filter(|f| f.kind == kind).collect();
        if kind_failures.is_empty() {
            println!("  ok    {} ({} fields)", kind, fields.len());
        } else {
            for failure in kind_failures {
                println!("  FAIL  {}: {}", kind, failure);
            }
        }
    }

    let failed_kinds = active
        .definition()
        .kinds()
        .filter(|k| failures.iter().any(|f| f.kind == *k))
        .count();
    println!(
        "{} kinds checked, {} failed",
        active.definition().len(),
        failed_kinds
    );
    failures.is_empty()
}

use std::{env, fs};

use pretty_assertions::assert_eq;
use trellis::{BuilderSession, Op};

/// Saving writes annotated lines and loading strips the annotations back to
/// the original source.
#[test]
fn save_then_load_restores_the_session() {
    let table = Op::table();
    let mut session = BuilderSession::new();
    for line in [
        ".const 2",
        ".const 3",
        ".local a",
        "load_const 0",
        "store_local a",
        "load_local a",
        "load_const 1",
        "binary_add",
        "return_value",
    ] {
        session.type_line(line);
    }

    let listing = session.save_listing(&table).unwrap();
    // Directive lines carry no annotation; instruction lines do.
    assert!(listing.contains(".const 2\n"));
    assert!(listing.contains("load_const 0 # "));
    assert!(listing.contains("[2]"));
    assert!(listing.contains("[a]"));

    let path = env::temp_dir().join(format!("trellis_save_load_{}.asm", std::process::id()));
    fs::write(&path, &listing).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let mut restored = BuilderSession::new();
    restored.load_listing(&text);
    assert_eq!(restored.source(), session.source());

    // The restored session assembles to the same program.
    let original = session.assemble(&table).unwrap().program;
    let reloaded = restored.assemble(&table).unwrap().program;
    assert_eq!(original, reloaded);
}

/// The `optimized` view reports the fixed point for a foldable program.
#[test]
fn optimized_view_reaches_the_fixed_point() {
    let table = Op::table();
    let mut session = BuilderSession::new();
    for line in [".const 2", ".const 3", "load_const 0", "load_const 1", "binary_add", "return_value"] {
        session.type_line(line);
    }

    let view = session.optimized(&table).unwrap();
    assert!(view.contains("load_const"));
    assert!(view.contains("[5]"));
    assert!(view.contains("fixed point after"));
}

/// The `structured` view renders the reconstruction of the current source.
#[test]
fn structured_view_renders_the_tree() {
    let table = Op::table();
    let mut session = BuilderSession::new();
    for line in [
        ".local i",
        "top:",
        "load_local i",
        "jump_if_false done",
        "load_local i",
        "pop",
        "jump top",
        "done:",
        "return_value",
    ] {
        session.type_line(line);
    }

    let view = session.structured(&table).unwrap();
    assert!(view.contains("While->"));
    assert!(view.contains("Conditional->"));
}

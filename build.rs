use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Write as _;
use std::path::Path;
use std::{env, fs};

const DEFAULT_LOCALE: &str = "en";

fn main() -> Result<(), Box<dyn Error>> {
    let locales_dir = Path::new("locales");
    println!("cargo:rerun-if-changed={}", locales_dir.display());

    let mut locales = BTreeMap::new();
    for entry in fs::read_dir(locales_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        let Some(locale) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        println!("cargo:rerun-if-changed={}", path.display());

        let table: toml::Table = toml::from_str(&fs::read_to_string(&path)?)?;
        let mut entries = BTreeMap::new();
        flatten("", &table, &mut entries);
        locales.insert(locale.to_string(), entries);
    }

    let mut generated = String::new();
    writeln!(generated, "pub const DEFAULT_LOCALE: &str = {DEFAULT_LOCALE:?};")?;
    writeln!(generated, "pub static LOCALES: &[(&str, &[(&str, &str)])] = &[")?;
    for (locale, entries) in &locales {
        writeln!(generated, "    ({locale:?}, &[")?;
        for (key, value) in entries {
            writeln!(generated, "        ({key:?}, {value:?}),")?;
        }
        writeln!(generated, "    ]),")?;
    }
    writeln!(generated, "];")?;

    let out_dir = env::var("OUT_DIR")?;
    fs::write(
        Path::new(&out_dir).join("console_forms_i18n_generated.rs"),
        generated,
    )?;
    Ok(())
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten(&full_key, nested, out),
            toml::Value::String(text) => {
                out.insert(full_key, text.clone());
            }
            other => {
                out.insert(full_key, other.to_string());
            }
        }
    }
}

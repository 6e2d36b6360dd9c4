// build.rs
//
// Generates `$OUT_DIR/messages.rs`: a `t!("key")` macro that expands to the
// message literal for the selected language, with English as the fallback.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

type Catalogue = BTreeMap<String, String>;

const FALLBACK: &str = "en";

fn main() {
    println!("cargo:rerun-if-env-changed=TANDEM_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales/");

    let lang = selected_language();
    println!("cargo:rustc-env=TANDEM_LANG_EFFECTIVE={}", lang);

    let mut messages = read_catalogue(FALLBACK)
        .unwrap_or_else(|| panic!("locales/{}.toml is required", FALLBACK));
    if lang != FALLBACK {
        match read_catalogue(&lang) {
            Some(overlay) => {
                for key in overlay.keys().filter(|k| !messages.contains_key(*k)) {
                    println!("cargo:warning=locales/{}.toml: '{}' has no English entry", lang, key);
                }
                messages.extend(overlay);
            }
            None => println!("cargo:warning=locales/{}.toml not found, using English", lang),
        }
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(Path::new(&out_dir).join("messages.rs"), render(&messages))
        .expect("failed to write messages.rs");
}

/// A `lang_*` cargo feature wins over `TANDEM_LANG`.
fn selected_language() -> String {
    let mut features: Vec<String> = env::vars()
        .filter_map(|(key, _)| {
            key.strip_prefix("CARGO_FEATURE_LANG_")
                .map(str::to_lowercase)
        })
        .collect();
    features.sort();

    if features.len() > 1 {
        println!("cargo:warning=several lang_* features enabled {:?}", features);
    }
    features
        .into_iter()
        .next()
        .or_else(|| env::var("TANDEM_LANG").ok())
        .unwrap_or_else(|| FALLBACK.to_string())
}

fn read_catalogue(lang: &str) -> Option<Catalogue> {
    let path = format!("locales/{}.toml", lang);
    let content = fs::read_to_string(&path).ok()?;
    Some(toml::from_str(&content).unwrap_or_else(|e| panic!("{}: {}", path, e)))
}

fn render(messages: &Catalogue) -> String {
    let mut code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, value) in messages {
        code.push_str(&format!("    ({:?}) => {{ {:?} }};\n", key, value));
    }
    // Unknown keys fail the build.
    code.push_str("    ($key:expr) => { compile_error!(concat!(\"unknown message key: \", $key)) };\n");
    code.push_str("}\n");
    code
}

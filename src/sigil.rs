use std::{collections::HashMap, process::exit};

use lazy_static::lazy_static;
use strum::{EnumIter, EnumProperty, EnumString, IntoEnumIterator};

/// Characters with special meaning inside a spec value string, used by
/// the placeholder tokenizer in [`crate::spec`].
#[derive(EnumProperty, EnumIter, EnumString, Hash, PartialEq, Eq, Debug, Clone, Copy)]
pub enum PlaceholderSigil {
    Non(char),
    #[strum(props(ch = "{"))]
    RefOpen,
    #[strum(props(ch = "}"))]
    RefClose,
}

lazy_static! {
    static ref PLACEHOLDER_SIGIL_CONVERSION_TABLE: HashMap<char, PlaceholderSigil> = {
        let mut table: HashMap<char, PlaceholderSigil> = HashMap::new();
        for sigil in PlaceholderSigil::iter() {
            let Some(s) = sigil.get_str("ch") else {
                continue;
            };
            if s.len() != 1 {
                eprintln!(
                    "PLACEHOLDER_SIGIL_CONVERSION_TABLE: property 'ch' had a string with .len() != 1"
                );
                exit(1);
            }
            let ch = s.chars().nth(0).unwrap();
            if let Some(existing) = table.get(&ch) {
                eprintln!(
                    "PLACEHOLDER_SIGIL_CONVERSION_TABLE: duplicate entry for '{}': {:?} and {:?}",
                    ch, existing, sigil
                );
                exit(1);
            }
            table.insert(ch, sigil);
        }
        table
    };
}

impl From<char> for PlaceholderSigil {
    fn from(value: char) -> Self {
        if let Some(sigil) = PLACEHOLDER_SIGIL_CONVERSION_TABLE.get(&value) {
            return sigil.to_owned();
        }
        PlaceholderSigil::Non(value)
    }
}

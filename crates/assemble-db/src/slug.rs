use rusqlite::Connection;

use crate::Result;

/// Tables that carry a globally unique `slug` column.
#[derive(Debug, Clone, Copy)]
pub enum SlugTable {
    Profiles,
    Projects,
    Components,
}

impl SlugTable {
    fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Projects => "projects",
            Self::Components => "components",
        }
    }
}

/// Lowercase ASCII slug. Runs of anything that is not a letter or digit
/// collapse into a single `-`.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_dash = false;
    for ch in raw.trim().chars() {
        let lc = ch.to_ascii_lowercase();
        if lc.is_ascii_alphanumeric() {
            out.push(lc);
            prev_dash = false;
        } else if !out.is_empty() && !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("item");
    }
    out
}

/// Slug for `name` that is not yet used in `table`: `name`, then `name-1`,
/// `name-2`, ...
pub fn unique_slug(conn: &Connection, table: SlugTable, name: &str) -> Result<String> {
    let base = slugify(name);
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ?1)",
        table.as_str()
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut candidate = base.clone();
    let mut num = 1;
    while stmt.query_row([&candidate], |row| row.get::<_, bool>(0))? {
        candidate = format!("{}-{}", base, num);
        num += 1;
    }
    Ok(candidate)
}

//! `filvyn notes`: List a user's saved notes from the local index.

use filvyn_core::{NoteMetaWithCid, UserId};
use filvyn_store::{JsonMetaIndex, MetaIndex};

use super::{load_config, CliResult};

pub async fn run(user: String, tag: Option<String>) -> CliResult {
    let config = load_config()?;
    let index = JsonMetaIndex::new(config.index_path());
    let user = UserId::new(user);

    let mut notes: Vec<NoteMetaWithCid> = index
        .load(&user)
        .await?
        .into_iter()
        .filter(|(_, meta)| tag.as_deref().is_none_or(|t| meta.has_tag(t)))
        .map(|(cid, meta)| meta.with_cid(cid))
        .collect();
    notes.sort_by(|a, b| a.meta.created_at.cmp(&b.meta.created_at));

    if notes.is_empty() {
        println!("No notes for {user}");
    } else {
        print!("{}", render(&notes));
    }
    Ok(())
}

fn render(notes: &[NoteMetaWithCid]) -> String {
    notes
        .iter()
        .map(|n| {
            format!(
                "{}  {}  {}  [{}]\n",
                n.meta.created_at,
                n.cid,
                n.meta.title,
                n.meta.tags.join(", ")
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filvyn_core::{Cid, Note};

    #[test]
    fn renders_one_line_per_note() {
        let note = Note::new("Cake", "flour", vec!["baking".into(), "dessert".into()]);
        let created = note.created_at.clone();
        let out = render(&[note.meta().with_cid(Cid::new("baga1"))]);
        assert_eq!(out, format!("{created}  baga1  Cake  [baking, dessert]\n"));
    }
}

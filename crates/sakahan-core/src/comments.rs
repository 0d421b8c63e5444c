//! # Comments
//!
//! Discussion threads attached to contributions.

use crate::error::{Error, Result};
use crate::primitives::{CommentId, ContributionId};
use crate::storage::{Reader, WriteTx};
use crate::types::{Comment, Contribution, User};
use crate::users;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

fn clean_content(raw: &str) -> Result<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(Error::invalid("content", "This field may not be blank."));
    }
    Ok(content.to_string())
}

fn ensure_owner(comment: &Comment, actor: &User) -> Result<()> {
    if comment.author == actor.id || actor.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden(
            "Only the author or an administrator can modify this comment.".to_string(),
        ))
    }
}

/// Post a comment on a contribution.
pub fn create(
    tx: &mut WriteTx,
    contribution: ContributionId,
    author: &User,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Comment> {
    let content = clean_content(content)?;
    if tx.get::<Contribution>(contribution.0)?.is_none() {
        return Err(Error::invalid(
            "contribution",
            format!("Invalid pk \"{}\" - object does not exist.", contribution),
        ));
    }
    users::remember(tx, author)?;

    let comment = Comment {
        id: CommentId(tx.next_id::<Comment>()?),
        contribution,
        author: author.id,
        content,
        date_created: now,
    };
    tx.put(&comment)?;
    tracing::debug!(comment = %comment.id, contribution = %contribution, "posted comment");
    Ok(comment)
}

/// Comments, optionally restricted to one contribution, grouped by the
/// calendar day they were posted. Each day is in creation order.
pub fn list_grouped(
    r: &impl Reader,
    contribution: Option<ContributionId>,
) -> Result<BTreeMap<NaiveDate, Vec<Comment>>> {
    let mut comments = match contribution {
        Some(id) => r.filter::<Comment>(|c| c.contribution == id)?,
        None => r.scan::<Comment>()?,
    };
    comments.sort_by(|a, b| a.date_created.cmp(&b.date_created).then(a.id.cmp(&b.id)));

    let mut grouped: BTreeMap<NaiveDate, Vec<Comment>> = BTreeMap::new();
    for comment in comments {
        grouped
            .entry(comment.date_created.date_naive())
            .or_default()
            .push(comment);
    }
    Ok(grouped)
}

/// Replace the content of a comment.
pub fn update(tx: &mut WriteTx, id: CommentId, actor: &User, content: &str) -> Result<Comment> {
    let mut comment = tx.require::<Comment>(id.0)?;
    ensure_owner(&comment, actor)?;
    comment.content = clean_content(content)?;
    tx.put(&comment)?;
    Ok(comment)
}

/// Delete a comment.
pub fn delete(tx: &mut WriteTx, id: CommentId, actor: &User) -> Result<Comment> {
    let comment = tx.require::<Comment>(id.0)?;
    ensure_owner(&comment, actor)?;
    tx.delete::<Comment>(id.0)?;
    tracing::debug!(comment = %id, "deleted comment");
    Ok(comment)
}

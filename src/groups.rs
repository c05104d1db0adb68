//! Course roster with group memberships, from the group inventory list.

use std::{collections::BTreeMap, sync::LazyLock};

use color_eyre::{Result, eyre::bail};
use scraper::{ElementRef, Selector};

use crate::{
	GroupMembership, GroupRef,
	datatable::{cell_text, read_table},
	elementtext::{element_text_content, selector},
	error::ParserError,
	session::Session,
};

const TABLE_ID: &str = "userGroupList_datatable";
const GROUP_ID_PREFIX: &str = "rmv_";

static GROUP_LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a.userGroupNameListItemRemove"));

#[derive(Clone, Debug, PartialEq)]
enum GroupCell {
	Text(String),
	Groups(Vec<GroupRef>),
}

/// Every user enrolled in the course, keyed by username, with the groups they belong to.
pub async fn read_groups<S: Session>(session: &S) -> Result<BTreeMap<String, GroupMembership>> {
	let url = session.url(&format!(
		"/webapps/bb-group-mgmt-LEARN/execute/groupInventoryList?course_id={}&toggleType=users&chkAllRoles=on",
		session.course_id()
	));
	let table = read_table(session, &url, TABLE_ID, extract).await?;

	let username = table.column("userorgroupname")?;
	let first_name = table.column("firstname")?;
	let last_name = table.column("lastname")?;
	let role = table.column("Role")?;
	let groups = table.column("Groups")?;

	let fail = |message: &str| -> color_eyre::Report { ParserError::new(message, table.response.clone()).into() };
	let text = |cell: &GroupCell| match cell {
		GroupCell::Text(text) => Ok(text.clone()),
		GroupCell::Groups(_) => Err(fail("Text column of userGroupList_datatable was read as a group list")),
	};

	let mut users = BTreeMap::new();
	for row in &table.rows {
		let membership = GroupMembership {
			username: text(&row[username])?,
			first_name: text(&row[first_name])?,
			last_name: text(&row[last_name])?,
			role: text(&row[role])?,
			groups: match &row[groups] {
				GroupCell::Groups(groups) => groups.clone(),
				GroupCell::Text(_) => return Err(fail("Groups column of userGroupList_datatable was read as text")),
			},
		};
		users.insert(membership.username.clone(), membership);
	}
	tracing::debug!(users = users.len(), "read group inventory");
	Ok(users)
}

fn extract(key: &str, cell: ElementRef<'_>, _: &[GroupCell]) -> Result<GroupCell> {
	if key != "Groups" {
		return Ok(GroupCell::Text(cell_text(cell)));
	}
	cell.select(&GROUP_LINKS)
		.map(|link| {
			let id = link.attr("id").unwrap_or_default();
			match id.strip_prefix(GROUP_ID_PREFIX) {
				Some(id) => Ok(GroupRef::new(element_text_content(link), id.to_owned())),
				None => bail!("Group link id {id:?} lacks the {GROUP_ID_PREFIX:?} prefix"),
			}
		})
		.collect::<Result<Vec<_>>>()
		.map(GroupCell::Groups)
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::identity::{is_more_current, resolve_identity};
use crate::types::{Character, Index, Sale, Server, Window};

/// Build the server -> character -> item index for the sales inside `window`.
///
/// The window is anchored at `reference`: a sale is kept when it is at most
/// `window.span` older than `reference`. Sales at or after `reference` are
/// always kept.
pub fn build_index(sales: &[Sale], reference: DateTime<Utc>, window: &Window) -> Index {
    let mut index = Index::default();

    for sale in sales.iter().filter(|s| window.contains(reference, s.time)) {
        accumulate(&mut index, sale);
    }

    index
}

fn accumulate(index: &mut Index, sale: &Sale) {
    let identity = resolve_identity(&sale.character);

    let server = index
        .servers
        .entry(sale.server.clone())
        .or_insert_with_key(|name| Server {
            name: name.clone(),
            characters: BTreeMap::new(),
        });

    let character = server
        .characters
        .entry(identity.key)
        .or_insert_with_key(|key| Character {
            identity_key: key.clone(),
            display_name: identity.display_name.clone(),
            last_seen: sale.time,
            items: BTreeMap::new(),
        });

    if is_more_current(sale.time, character.last_seen) {
        character.last_seen = sale.time;
        character.display_name = identity.display_name;
    }

    character
        .items
        .entry(sale.item.clone())
        .or_default()
        .add(sale.quantity, sale.price);
}

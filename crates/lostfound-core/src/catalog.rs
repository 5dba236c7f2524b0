//! The item listing shown on the home page and searched by image matching,
//! plus the people who posted the items and their message threads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub enum Category {
    Electronics,
    #[serde(rename = "Laptops & Chargers")]
    LaptopsAndChargers,
    Keys,
    Wallets,
    #[serde(rename = "Student IDs")]
    StudentIds,
    Clothing,
    Bags,
    #[serde(rename = "Water Bottles")]
    WaterBottles,
    Books,
    #[serde(rename = "Personal Items")]
    PersonalItems,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub enum ItemStatus {
    Lost,
    Found,
    Claimed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub location: String,
    /// ISO-8601 date or timestamp
    pub date_lost: String,
    pub category: Category,
    pub status: ItemStatus,
    pub user_id: String,
}

impl Item {
    /// The text offered to the image matcher as a candidate for this item.
    pub fn candidate_label(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }
}

/// Candidate labels for every item, optionally restricted to one status.
pub fn candidate_labels(items: &[Item], status: Option<ItemStatus>) -> Vec<String> {
    items
        .iter()
        .filter(|item| status.map_or(true, |s| item.status == s))
        .map(Item::candidate_label)
        .collect()
}

/// Map a matched candidate label back to its item.
pub fn find_by_candidate<'a>(items: &'a [Item], label: &str) -> Option<&'a Item> {
    items.iter().find(|item| item.candidate_label() == label)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub sender_id: String,
    pub receiver_id: String,
}

/// An item together with the user who posted it, as shown on its detail page.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemDetail<'a> {
    pub item: &'a Item,
    /// `None` when the poster is not a known user
    pub owner: Option<&'a User>,
}

pub fn find_item<'a>(items: &'a [Item], users: &'a [User], id: &str) -> Option<ItemDetail<'a>> {
    let item = items.iter().find(|item| item.id == id)?;
    let owner = users.iter().find(|user| user.id == item.user_id);
    Some(ItemDetail { item, owner })
}

/// Message threads keyed by item id.
pub type Threads = BTreeMap<String, Vec<Message>>;

/// The thread about `item_id`, oldest first. Items nobody has written about
/// have an empty thread.
pub fn messages_for<'a>(threads: &'a Threads, item_id: &str) -> &'a [Message] {
    threads.get(item_id).map(Vec::as_slice).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: Category,
    pub count: usize,
}

/// Dashboard figures over a listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemStats {
    pub total_items: usize,
    pub lost_items: usize,
    pub found_items: usize,
    pub claimed_items: usize,
    /// Percentage of items claimed, one decimal place ("14.3")
    pub claim_rate: String,
    /// Items per category, in order of first appearance in the listing
    pub categories: Vec<CategoryCount>,
}

pub fn item_stats(items: &[Item]) -> ItemStats {
    let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();
    let total_items = items.len();
    let claimed_items = count(ItemStatus::Claimed);
    let claim_rate = if total_items > 0 {
        claimed_items as f64 / total_items as f64 * 100.0
    } else {
        0.0
    };

    let mut categories: Vec<CategoryCount> = Vec::new();
    for item in items {
        match categories.iter_mut().find(|c| c.name == item.category) {
            Some(entry) => entry.count += 1,
            None => categories.push(CategoryCount {
                name: item.category,
                count: 1,
            }),
        }
    }

    ItemStats {
        total_items,
        lost_items: count(ItemStatus::Lost),
        found_items: count(ItemStatus::Found),
        claimed_items,
        claim_rate: format!("{claim_rate:.1}"),
        categories,
    }
}

struct Seed {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    location: &'static str,
    date_lost: &'static str,
    category: Category,
    status: ItemStatus,
    user_id: &'static str,
}

const SEED: &[Seed] = &[
    Seed {
        id: "7",
        name: "Blue Student ID Card",
        description: "A student ID for RGUKT with the name 'Test User'. It's in a clear plastic sleeve.",
        location: "Library, 2nd Floor",
        date_lost: "2024-07-24",
        category: Category::StudentIds,
        status: ItemStatus::Lost,
        user_id: "user-2",
    },
    Seed {
        id: "1",
        name: "Classic Ray-Ban Sunglasses",
        description: "A pair of black Ray-Ban Wayfarer sunglasses in a black case. Last seen near the main fountain in the central park. They have a small scratch on the right lens.",
        location: "Central Park, by the fountain",
        date_lost: "2024-07-15",
        category: Category::PersonalItems,
        status: ItemStatus::Lost,
        user_id: "user-1",
    },
    Seed {
        id: "2",
        name: "iPhone 14 Pro",
        description: "A deep purple iPhone 14 Pro with a clear case. The wallpaper is a picture of a golden retriever puppy. It has a small crack on the top left corner of the screen.",
        location: "Seat 14C, Flight UA482 to SFO",
        date_lost: "2024-07-20",
        category: Category::Electronics,
        status: ItemStatus::Lost,
        user_id: "user-2",
    },
    Seed {
        id: "3",
        name: "Leather Wallet",
        description: "Brown leather bifold wallet, slightly worn. Contained a driver's license for 'John Smith' and a few credit cards. Also had a sentimental photo of a family.",
        location: "Grand Central Terminal, near track 23",
        date_lost: "2024-07-21",
        category: Category::Wallets,
        status: ItemStatus::Found,
        user_id: "user-1",
    },
    Seed {
        id: "4",
        name: "Car Keys - Toyota",
        description: "A single Toyota car key with a small silver keychain that has the initial 'B' on it. There's also a small grocery store loyalty tag attached.",
        location: "Parking Lot 4B, Westfield Mall",
        date_lost: "2024-07-18",
        category: Category::Keys,
        status: ItemStatus::Lost,
        user_id: "user-2",
    },
    Seed {
        id: "5",
        name: "Kindle Paperwhite",
        description: "Black Kindle Paperwhite with a dark blue cover. The screen saver shows abstract art. It was left on a bench at the city library's garden.",
        location: "City Library Garden",
        date_lost: "2024-07-22",
        category: Category::Electronics,
        status: ItemStatus::Claimed,
        user_id: "user-1",
    },
    Seed {
        id: "6",
        name: "Red Umbrella",
        description: "A large, bright red umbrella with a wooden handle. It has no brand name on it. Left on the 5th Ave bus.",
        location: "5th Avenue Bus",
        date_lost: "2024-07-19",
        category: Category::Other,
        status: ItemStatus::Lost,
        user_id: "user-2",
    },
];

const USERS: &[(&str, &str)] = &[("user-1", "Alice"), ("user-2", "Bob")];

pub fn seed_users() -> Vec<User> {
    USERS
        .iter()
        .map(|(id, name)| User {
            id: id.to_string(),
            name: name.to_string(),
            avatar_url: format!("https://picsum.photos/seed/{id}/40/40"),
        })
        .collect()
}

// (item id, message id, text, timestamp, sender, receiver)
const MESSAGES: &[(&str, &str, &str, &str, &str, &str)] = &[
    (
        "1",
        "msg-1",
        "Hi, I think you might have my sunglasses. Can you describe the scratch on them?",
        "2024-07-23T10:00:00Z",
        "user-1",
        "finder-1",
    ),
    (
        "1",
        "msg-2",
        "Sure, it's a small vertical scratch on the right lens, near the top.",
        "2024-07-23T10:02:00Z",
        "finder-1",
        "user-1",
    ),
    (
        "1",
        "msg-3",
        "That's them! Thank you so much for finding them. Where can I meet you to pick them up?",
        "2024-07-23T10:03:00Z",
        "user-1",
        "finder-1",
    ),
];

pub fn seed_threads() -> Threads {
    let mut threads = Threads::new();
    for (item_id, id, text, timestamp, sender, receiver) in MESSAGES {
        threads.entry(item_id.to_string()).or_default().push(Message {
            id: id.to_string(),
            text: text.to_string(),
            timestamp: timestamp.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
        });
    }
    threads
}

/// The built-in listing, in display order.
pub fn seed_items() -> Vec<Item> {
    SEED.iter()
        .map(|s| Item {
            id: s.id.to_string(),
            name: s.name.to_string(),
            description: s.description.to_string(),
            image_url: format!("https://picsum.photos/seed/item-{}/600/400", s.id),
            location: s.location.to_string(),
            date_lost: s.date_lost.to_string(),
            category: s.category,
            status: s.status,
            user_id: s.user_id.to_string(),
        })
        .collect()
}

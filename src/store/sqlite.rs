use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, TubeshelfError};
use crate::domain::{
    Category, CategoryUpdate, ContentPreferences, Item, ItemStatus, ItemUpsert, ListedItem,
    NewCategory, NewSource, Source, SourceType, SourceUpdate, StatusUpdate,
};
use crate::store::{ItemListQuery, SourceSummary, Store, UpsertOutcome};

const SOURCE_COLUMNS: &str = "s.id, s.name, s.url, s.rss_url, s.source_type, s.want_videos,
     s.want_shorts, s.want_lives, s.active, s.category_id, s.last_fetch, s.last_http_status,
     s.error_message, s.fail_count, s.created_at";

const ITEM_COLUMNS: &str = "i.id, i.source_id, i.title, i.link, i.description, i.pub_date,
     i.thumbnail, i.duration, i.item_type";

const CATEGORY_COLUMNS: &str = "id, name, parent_id, profile_id, active, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Self::register_functions(&conn)?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| TubeshelfError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    /// `fold(text)` lowercases with full Unicode case mapping; the built-in
    /// `LIKE` only folds ASCII.
    fn register_functions(conn: &Connection) -> Result<()> {
        conn.create_scalar_function(
            "fold",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TubeshelfError::Other(format!("Store lock poisoned: {}", e)))
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    /// Fixed-precision UTC form so lexical order matches chronological order.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
    where
        T: FromStr<Err = TubeshelfError>,
    {
        value
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
        Ok(Source {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            rss_url: row.get(3)?,
            source_type: Self::parse_column::<SourceType>(4, row.get(4)?)?,
            preferences: ContentPreferences {
                want_videos: row.get(5)?,
                want_shorts: row.get(6)?,
                want_lives: row.get(7)?,
            },
            active: row.get(8)?,
            category_id: row.get(9)?,
            last_fetch: row
                .get::<_, Option<String>>(10)?
                .and_then(|s| Self::parse_datetime(&s)),
            last_http_status: row.get(11)?,
            error_message: row.get(12)?,
            fail_count: row.get(13)?,
            created_at: row
                .get::<_, String>(14)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get(0)?,
            source_id: row.get(1)?,
            title: row.get(2)?,
            link: row.get(3)?,
            description: row.get(4)?,
            pub_date: row
                .get::<_, String>(5)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
            thumbnail: row.get(6)?,
            duration: row.get(7)?,
            content_type: Self::parse_column(8, row.get(8)?)?,
        })
    }

    fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            parent_id: row.get(2)?,
            profile_id: row.get(3)?,
            active: row.get(4)?,
            created_at: row
                .get::<_, String>(5)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    /// Unique and foreign key violations surface as persistence conflicts.
    fn map_constraint(err: rusqlite::Error) -> TubeshelfError {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.code == ErrorCode::ConstraintViolation =>
            {
                TubeshelfError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            other => TubeshelfError::Database(other),
        }
    }

    fn escape_like(term: &str) -> String {
        let mut escaped = String::with_capacity(term.len() + 2);
        escaped.push('%');
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }
}

impl Store for SqliteStore {
    fn add_category(&self, category: &NewCategory) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO categories (name, parent_id, profile_id, active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![
                category.name,
                category.parent_id,
                category.profile_id,
                Self::format_datetime(&Utc::now())
            ],
        )
        .map_err(Self::map_constraint)?;

        Ok(conn.last_insert_rowid())
    }

    fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                params![id],
                Self::row_to_category,
            )
            .optional()?;

        Ok(result)
    }

    fn find_category_by_name(&self, profile_id: i64, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM categories WHERE profile_id = ?1 AND name = ?2
                     ORDER BY active DESC, id LIMIT 1",
                    CATEGORY_COLUMNS
                ),
                params![profile_id, name],
                Self::row_to_category,
            )
            .optional()?;

        Ok(result)
    }

    fn get_categories(&self, profile_id: i64, include_inactive: bool) -> Result<Vec<Category>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM categories
             WHERE profile_id = ?1 AND (?2 OR active = 1)
             ORDER BY id",
            CATEGORY_COLUMNS
        ))?;

        let categories = stmt
            .query_map(params![profile_id, include_inactive], Self::row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    fn update_category(&self, id: i64, update: &CategoryUpdate) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(ref name) = update.name {
            tx.execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2",
                params![name, id],
            )?;
        }
        if let Some(parent_id) = update.parent_id {
            tx.execute(
                "UPDATE categories SET parent_id = ?1 WHERE id = ?2",
                params![parent_id, id],
            )
            .map_err(Self::map_constraint)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn set_category_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE categories SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(TubeshelfError::CategoryNotFound(id));
        }

        Ok(())
    }

    fn add_source(&self, source: &NewSource) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO sources (name, url, rss_url, source_type, want_videos, want_shorts,
                                  want_lives, active, category_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)",
            params![
                source.name,
                source.url,
                source.rss_url,
                source.source_type.as_str(),
                source.preferences.want_videos,
                source.preferences.want_shorts,
                source.preferences.want_lives,
                source.category_id,
                Self::format_datetime(&Utc::now())
            ],
        )
        .map_err(Self::map_constraint)?;

        Ok(conn.last_insert_rowid())
    }

    fn upsert_source(&self, source: &NewSource) -> Result<UpsertOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM sources WHERE category_id = ?1 AND rss_url = ?2",
                params![source.category_id, source.rss_url],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(id) => {
                tx.execute("UPDATE sources SET active = 1 WHERE id = ?1", params![id])?;
                UpsertOutcome::Updated(id)
            }
            None => {
                tx.execute(
                    "INSERT INTO sources (name, url, rss_url, source_type, want_videos,
                                          want_shorts, want_lives, active, category_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)",
                    params![
                        source.name,
                        source.url,
                        source.rss_url,
                        source.source_type.as_str(),
                        source.preferences.want_videos,
                        source.preferences.want_shorts,
                        source.preferences.want_lives,
                        source.category_id,
                        Self::format_datetime(&Utc::now())
                    ],
                )
                .map_err(Self::map_constraint)?;
                UpsertOutcome::Created(tx.last_insert_rowid())
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM sources s WHERE s.id = ?1", SOURCE_COLUMNS),
                params![id],
                Self::row_to_source,
            )
            .optional()?;

        Ok(result)
    }

    fn get_all_sources(&self) -> Result<Vec<SourceSummary>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, (SELECT COUNT(*) FROM items i WHERE i.source_id = s.id)
             FROM sources s ORDER BY s.name, s.id",
            SOURCE_COLUMNS
        ))?;

        let sources = stmt
            .query_map([], |row| {
                Ok(SourceSummary {
                    source: Self::row_to_source(row)?,
                    item_count: row.get(15)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sources)
    }

    fn get_syncable_sources(&self) -> Result<Vec<Source>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sources s
             WHERE s.active = 1 AND s.source_type = ?1
             ORDER BY s.id",
            SOURCE_COLUMNS
        ))?;

        let sources = stmt
            .query_map(params![SourceType::Youtube.as_str()], Self::row_to_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sources)
    }

    fn update_source(&self, id: i64, update: &SourceUpdate) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(ref name) = update.name {
            tx.execute(
                "UPDATE sources SET name = ?1 WHERE id = ?2",
                params![name, id],
            )?;
        }
        if let Some(category_id) = update.category_id {
            tx.execute(
                "UPDATE sources SET category_id = ?1 WHERE id = ?2",
                params![category_id, id],
            )
            .map_err(Self::map_constraint)?;
        }
        if let Some(want_videos) = update.want_videos {
            tx.execute(
                "UPDATE sources SET want_videos = ?1 WHERE id = ?2",
                params![want_videos, id],
            )?;
        }
        if let Some(want_shorts) = update.want_shorts {
            tx.execute(
                "UPDATE sources SET want_shorts = ?1 WHERE id = ?2",
                params![want_shorts, id],
            )?;
        }
        if let Some(want_lives) = update.want_lives {
            tx.execute(
                "UPDATE sources SET want_lives = ?1 WHERE id = ?2",
                params![want_lives, id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn set_source_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE sources SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(TubeshelfError::SourceNotFound(id));
        }

        Ok(())
    }

    fn record_sync_success(&self, id: i64, http_status: u16, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "UPDATE sources
             SET last_fetch = ?1, last_http_status = ?2, error_message = NULL,
                 fail_count = 0, active = 1
             WHERE id = ?3",
            params![Self::format_datetime(&at), http_status, id],
        )?;

        Ok(())
    }

    fn record_sync_failure(
        &self,
        id: i64,
        http_status: u16,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "UPDATE sources
             SET last_fetch = ?1, last_http_status = ?2, error_message = ?3,
                 fail_count = fail_count + 1
             WHERE id = ?4",
            params![Self::format_datetime(&at), http_status, message, id],
        )?;

        Ok(())
    }

    fn upsert_items(&self, items: &[ItemUpsert]) -> Result<usize> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let mut count = 0;

        for item in items {
            tx.execute(
                "INSERT INTO items (id, source_id, title, link, description, pub_date,
                                    thumbnail, item_type)
                 VALUES (?1, ?2, COALESCE(?3, 'Untitled'), ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(source_id, link) DO UPDATE SET
                     title = COALESCE(?3, title),
                     thumbnail = COALESCE(excluded.thumbnail, thumbnail),
                     description = excluded.description,
                     item_type = excluded.item_type",
                params![
                    item.id(),
                    item.source_id,
                    item.title,
                    item.link,
                    item.description,
                    Self::format_datetime(&item.pub_date),
                    item.thumbnail,
                    item.content_type.as_str()
                ],
            )
            .map_err(Self::map_constraint)?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM items i WHERE i.id = ?1", ITEM_COLUMNS),
                params![id],
                Self::row_to_item,
            )
            .optional()?;

        Ok(result)
    }

    fn get_items_by_source(&self, source_id: i64) -> Result<Vec<Item>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items i WHERE i.source_id = ?1 ORDER BY i.pub_date DESC, i.id DESC",
            ITEM_COLUMNS
        ))?;

        let items = stmt
            .query_map(params![source_id], Self::row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn set_item_duration(&self, id: &str, seconds: u32) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE items SET duration = ?1 WHERE id = ?2",
            params![seconds, id],
        )?;
        if changed == 0 {
            return Err(TubeshelfError::ItemNotFound(id.to_string()));
        }

        Ok(())
    }

    fn list_items(&self, query: &ItemListQuery) -> Result<Vec<ListedItem>> {
        let mut sql = format!(
            "SELECT {}, s.name, s.category_id, st.is_read, st.play_progress, st.is_favorite
             FROM items i
             JOIN sources s ON s.id = i.source_id
             JOIN categories c ON c.id = s.category_id
             LEFT JOIN item_statuses st ON st.item_id = i.id AND st.profile_id = ?
             WHERE s.active = 1 AND c.profile_id = ?",
            ITEM_COLUMNS
        );
        let mut values: Vec<Box<dyn ToSql>> =
            vec![Box::new(query.profile_id), Box::new(query.profile_id)];

        if let Some(source_id) = query.source_id {
            sql.push_str(" AND i.source_id = ?");
            values.push(Box::new(source_id));
        }
        if let Some(ref category_ids) = query.category_ids {
            let placeholders = vec!["?"; category_ids.len()].join(", ");
            sql.push_str(&format!(" AND s.category_id IN ({})", placeholders));
            for id in category_ids {
                values.push(Box::new(*id));
            }
        }
        if let Some(content_type) = query.content_type {
            sql.push_str(" AND i.item_type = ?");
            values.push(Box::new(content_type.as_str()));
        }
        if let Some(ref term) = query.search {
            let pattern = Self::escape_like(term);
            if query.search_source_names {
                sql.push_str(
                    " AND (fold(i.title) LIKE fold(?) ESCAPE '\\'
                          OR fold(s.name) LIKE fold(?) ESCAPE '\\')",
                );
                values.push(Box::new(pattern.clone()));
                values.push(Box::new(pattern));
            } else {
                sql.push_str(" AND fold(i.title) LIKE fold(?) ESCAPE '\\'");
                values.push(Box::new(pattern));
            }
        }
        if query.unread_only {
            sql.push_str(
                " AND NOT EXISTS (SELECT 1 FROM item_statuses r
                                  WHERE r.item_id = i.id AND r.profile_id = ? AND r.is_read = 1)",
            );
            values.push(Box::new(query.profile_id));
        }
        if let Some(ref after) = query.after {
            let pub_date = Self::format_datetime(&after.pub_date);
            sql.push_str(" AND (i.pub_date < ? OR (i.pub_date = ? AND i.id < ?))");
            values.push(Box::new(pub_date.clone()));
            values.push(Box::new(pub_date));
            values.push(Box::new(after.id.clone()));
        }
        sql.push_str(" ORDER BY i.pub_date DESC, i.id DESC LIMIT ?");
        values.push(Box::new(query.limit as i64));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;

        let items = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let status = match row.get::<_, Option<bool>>(11)? {
                    Some(is_read) => Some(ItemStatus {
                        is_read,
                        play_progress: row.get(12)?,
                        is_favorite: row.get(13)?,
                    }),
                    None => None,
                };
                Ok(ListedItem {
                    item: Self::row_to_item(row)?,
                    source_name: row.get(9)?,
                    source_category_id: row.get(10)?,
                    status,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn get_item_status(&self, profile_id: i64, item_id: &str) -> Result<Option<ItemStatus>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                "SELECT is_read, play_progress, is_favorite
                 FROM item_statuses WHERE profile_id = ?1 AND item_id = ?2",
                params![profile_id, item_id],
                |row| {
                    Ok(ItemStatus {
                        is_read: row.get(0)?,
                        play_progress: row.get(1)?,
                        is_favorite: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    fn upsert_item_status(
        &self,
        profile_id: i64,
        item_id: &str,
        update: &StatusUpdate,
    ) -> Result<ItemStatus> {
        let conn = self.conn()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE id = ?1)",
            params![item_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(TubeshelfError::ItemNotFound(item_id.to_string()));
        }

        let status = conn.query_row(
            "INSERT INTO item_statuses (profile_id, item_id, is_read, play_progress, is_favorite)
             VALUES (?1, ?2, COALESCE(?3, 0), COALESCE(?4, 0), COALESCE(?5, 0))
             ON CONFLICT(profile_id, item_id) DO UPDATE SET
                 is_read = COALESCE(?3, is_read),
                 play_progress = COALESCE(?4, play_progress),
                 is_favorite = COALESCE(?5, is_favorite)
             RETURNING is_read, play_progress, is_favorite",
            params![
                profile_id,
                item_id,
                update.is_read,
                update.play_progress,
                update.is_favorite
            ],
            |row| {
                Ok(ItemStatus {
                    is_read: row.get(0)?,
                    play_progress: row.get(1)?,
                    is_favorite: row.get(2)?,
                })
            },
        )?;

        Ok(status)
    }
}

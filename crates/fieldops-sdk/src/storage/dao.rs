//! 记录集 DAO - 所有实体表共用同一张表结构
//!
//! 列布局（见 migrations/V1__init.sql）：
//! id / parent_id / needs_sync / sync_priority / last_synced_at / deleted_at / payload
//!
//! 同步控制字段是真实列（dirty 查询走索引），业务字段在 payload(JSON)。
//! 表名统一引号括起（"user" 与关键字撞名）。

use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::storage::dirty::SyncPriority;

/// 一行记录的原始形态（payload 未解码）
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub needs_sync: bool,
    pub sync_priority: SyncPriority,
    pub last_synced_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub payload: String,
}

pub struct RecordDao<'a> {
    conn: &'a Connection,
    table: &'static str,
}

const COLUMNS: &str = "id, parent_id, needs_sync, sync_priority, last_synced_at, deleted_at, payload";

impl<'a> RecordDao<'a> {
    pub fn new(conn: &'a Connection, table: &'static str) -> Self {
        Self { conn, table }
    }

    pub fn upsert(&self, row: &RecordRow) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO "{}" ({})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                parent_id = excluded.parent_id,
                needs_sync = excluded.needs_sync,
                sync_priority = excluded.sync_priority,
                last_synced_at = excluded.last_synced_at,
                deleted_at = excluded.deleted_at,
                payload = excluded.payload
            "#,
            self.table, COLUMNS
        );
        self.conn.execute(
            &sql,
            params![
                row.id,
                row.parent_id,
                row.needs_sync as i32,
                row.sync_priority.value(),
                row.last_synced_at,
                row.deleted_at,
                row.payload,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<RecordRow>> {
        let sql = format!(r#"SELECT {} FROM "{}" WHERE id = ?1"#, COLUMNS, self.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], row_to_record)?;
        Ok(rows.next().transpose()?)
    }

    /// 全表记录；`include_deleted=false` 时过滤 tombstone
    pub fn list(&self, include_deleted: bool) -> Result<Vec<RecordRow>> {
        let sql = if include_deleted {
            format!(r#"SELECT {} FROM "{}""#, COLUMNS, self.table)
        } else {
            format!(
                r#"SELECT {} FROM "{}" WHERE deleted_at IS NULL"#,
                COLUMNS, self.table
            )
        };
        self.collect(&sql, params![])
    }

    pub fn list_by_parent(&self, parent_id: &str, include_deleted: bool) -> Result<Vec<RecordRow>> {
        let sql = if include_deleted {
            format!(
                r#"SELECT {} FROM "{}" WHERE parent_id = ?1"#,
                COLUMNS, self.table
            )
        } else {
            format!(
                r#"SELECT {} FROM "{}" WHERE parent_id = ?1 AND deleted_at IS NULL"#,
                COLUMNS, self.table
            )
        };
        self.collect(&sql, params![parent_id])
    }

    /// dirty 记录，优先级列升序（数值小 = 更紧急）；同优先级顺序无保证
    pub fn dirty(&self) -> Result<Vec<RecordRow>> {
        let sql = format!(
            r#"SELECT {} FROM "{}" WHERE needs_sync = 1 ORDER BY sync_priority ASC"#,
            COLUMNS, self.table
        );
        self.collect(&sql, params![])
    }

    pub fn dirty_count(&self) -> Result<u32> {
        let sql = format!(
            r#"SELECT COUNT(*) FROM "{}" WHERE needs_sync = 1"#,
            self.table
        );
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// 标 dirty；已 dirty 时只会把优先级升档（MIN），不会降档
    pub fn mark_dirty(&self, id: &str, priority: SyncPriority) -> Result<bool> {
        let sql = format!(
            r#"
            UPDATE "{}" SET
                sync_priority = CASE WHEN needs_sync = 1
                    THEN MIN(sync_priority, ?1) ELSE ?1 END,
                needs_sync = 1
            WHERE id = ?2
            "#,
            self.table
        );
        let affected = self.conn.execute(&sql, params![priority.value(), id])?;
        Ok(affected > 0)
    }

    /// 确认推送完成：清 dirty 并单调推进 last_synced_at（只增不减）
    pub fn clear_dirty(&self, id: &str, synced_at: i64) -> Result<()> {
        let sql = format!(
            r#"
            UPDATE "{}" SET
                needs_sync = 0,
                last_synced_at = MAX(COALESCE(last_synced_at, 0), ?1)
            WHERE id = ?2
            "#,
            self.table
        );
        self.conn.execute(&sql, params![synced_at, id])?;
        Ok(())
    }

    /// 只单调推进 last_synced_at，不清 dirty
    /// （推送确认时发现记录又被编辑过的场景）
    pub fn touch_synced(&self, id: &str, synced_at: i64) -> Result<()> {
        let sql = format!(
            r#"UPDATE "{}" SET last_synced_at = MAX(COALESCE(last_synced_at, 0), ?1) WHERE id = ?2"#,
            self.table
        );
        self.conn.execute(&sql, params![synced_at, id])?;
        Ok(())
    }

    pub fn set_deleted(&self, id: &str, deleted_at: i64) -> Result<bool> {
        let sql = format!(r#"UPDATE "{}" SET deleted_at = ?1 WHERE id = ?2"#, self.table);
        let affected = self.conn.execute(&sql, params![deleted_at, id])?;
        Ok(affected > 0)
    }

    /// 只改 payload，不动同步控制列（投影位重算等派生写入用）
    pub fn update_payload(&self, id: &str, payload: &str) -> Result<()> {
        let sql = format!(r#"UPDATE "{}" SET payload = ?1 WHERE id = ?2"#, self.table);
        self.conn.execute(&sql, params![payload, id])?;
        Ok(())
    }

    /// 本地占位 id 换服务端 id（首次推送成功后）
    pub fn rekey(&self, old_id: &str, new_id: &str) -> Result<()> {
        let sql = format!(r#"UPDATE "{}" SET id = ?1 WHERE id = ?2"#, self.table);
        self.conn.execute(&sql, params![new_id, old_id])?;
        Ok(())
    }

    /// payload 里包含给定子串的记录（rekey 时扫引用的预过滤；
    /// 占位 id 是 uuid，LIKE 误命中概率可忽略，真正替换由类型化 replace_ref 做）
    pub fn payload_containing(&self, needle: &str) -> Result<Vec<RecordRow>> {
        let sql = format!(
            r#"SELECT {} FROM "{}" WHERE payload LIKE '%' || ?1 || '%'"#,
            COLUMNS, self.table
        );
        self.collect(&sql, params![needle])
    }

    fn collect(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<RecordRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut out = Vec::new();
        let mut rows = stmt.query(args)?;
        while let Some(row) = rows.next()? {
            out.push(row_to_record(row)?);
        }
        Ok(out)
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        needs_sync: row.get::<_, i32>(2)? != 0,
        sync_priority: SyncPriority::from(row.get::<_, u8>(3)?),
        last_synced_at: row.get(4)?,
        deleted_at: row.get(5)?,
        payload: row.get(6)?,
    })
}

//! 数据库迁移与初始化 - 由 refinery 自动管理
//!
//! 设计原则：
//! - Migration 版本 = migrations 文件顺序，无需手写内置 SQL 常量。
//! - 统一入口 `init_db`：pragmas → migrate → 版本校验，避免多处初始化或忘记 migrate。
//! - 新增迁移只需在 migrations/ 添加 V{n}__{name}.sql，编译期自动嵌入、自动执行。

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use rusqlite::Connection;

use crate::error::{FieldOpsSDKError, Result};
use crate::version::SDK_DB_VERSION;

/// refinery 使用的 migration 历史表名（与 refinery 默认一致，用于版本校验）
const REFINERY_TABLE: &str = "refinery_schema_history";

/// 离线客户端推荐 PRAGMA：WAL、NORMAL 同步、外键、内存临时表。
const STORE_PRAGMAS: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
PRAGMA temp_store=MEMORY;
";

/// 开启写入性能与崩溃安全相关 pragmas。
pub fn enable_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(STORE_PRAGMAS.trim())
        .map_err(|e| FieldOpsSDKError::Database(format!("设置 PRAGMA 失败: {}", e)))?;
    Ok(())
}

/// 执行内置 migrations（编译期嵌入，自动按版本顺序执行）。
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| FieldOpsSDKError::Migration(format!("执行 migration 失败: {}", e)))?;
    Ok(())
}

/// 读取 refinery 表中当前数据库的 migration 版本；无表或空表返回 None。
fn get_db_migration_version(conn: &Connection) -> Result<Option<i64>> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            [REFINERY_TABLE],
            |row| row.get(0),
        )
        .map_err(|e| FieldOpsSDKError::Database(format!("查询 {} 失败: {}", REFINERY_TABLE, e)))?;

    if !exists {
        return Ok(None);
    }

    let version: Option<i64> = conn
        .query_row(
            &format!("SELECT MAX(version) FROM {}", REFINERY_TABLE),
            [],
            |row| row.get(0),
        )
        .map_err(|e| FieldOpsSDKError::Database(format!("读取 migration 版本失败: {}", e)))?;
    Ok(version)
}

/// 统一初始化入口：pragmas → migrations → 版本校验。
///
/// 若 DB 版本高于当前 SDK 支持的最高版本（downgrade 安装），拒绝打开，
/// 避免旧代码按旧 schema 误写新库。
pub fn init_db(conn: &mut Connection) -> Result<()> {
    enable_pragmas(conn)?;
    run_migrations(conn)?;

    let db_version = get_db_migration_version(conn)?.unwrap_or(0);
    if db_version > SDK_DB_VERSION {
        return Err(FieldOpsSDKError::Migration(format!(
            "数据库 migration 版本 {} 高于 SDK 支持的 {}，拒绝打开（可能是 SDK 降级安装）",
            db_version, SDK_DB_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db_creates_all_record_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
                 ('company','user','client','sub_client','task_type','project', \
                  'project_task','calendar_event','inventory_unit','inventory_tag', \
                  'inventory_item','inventory_snapshot')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 12);
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        // 二次初始化不应重复执行迁移或报错
        init_db(&mut conn).unwrap();
        let version = get_db_migration_version(&conn).unwrap();
        assert_eq!(version, Some(SDK_DB_VERSION));
    }
}

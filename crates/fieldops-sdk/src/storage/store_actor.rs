//! 实体库 Actor - 单写者模型
//!
//! 核心设计：
//! - SQLite Connection 永远只在一个专用线程中
//! - 所有记录读写通过 channel 发送命令，oneshot 回传结果
//! - 网络任务并发跑，但写入一律交回本线程，不存在交错的半写
//! - 排期投影（active 缓存位）在写线程内同步重算，命令返回时不变式已恢复

use crossbeam_channel::{unbounded, Receiver, Sender};
use rusqlite::Connection;
use std::path::PathBuf;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::error::{FieldOpsSDKError, Result};
use crate::schedule::projector;
use crate::storage::dao::{RecordDao, RecordRow};
use crate::storage::dirty::SyncPriority;
use crate::storage::entities::{new_local_id, AnyRecord, CalendarEvent};
use crate::storage::migrate;
use crate::sync::entity_type::{EntityKind, SYNC_ORDER};

/// 实体库命令
pub enum StoreCommand {
    /// 本地变更落库：标 dirty、必要时分配本地占位 id；返回最终 id
    Save {
        record: AnyRecord,
        priority: SyncPriority,
        respond_to: tokio::sync::oneshot::Sender<Result<String>>,
    },

    /// 应用一条拉取到的权威记录（冲突与软删除规则见 handle_apply_pulled）
    ApplyPulled {
        record: AnyRecord,
        respond_to: tokio::sync::oneshot::Sender<Result<()>>,
    },

    /// 确认一条记录推送成功：清 dirty、换 id（首推）、单调推进 last_synced_at
    ConfirmPush {
        kind: EntityKind,
        local_id: String,
        remote_id: String,
        /// 推送时刻的记录快照；与当前 payload 不一致说明推送期间又被改过，
        /// 此时保持 dirty 等下一轮
        pushed: AnyRecord,
        synced_at: i64,
        respond_to: tokio::sync::oneshot::Sender<Result<()>>,
    },

    /// 本地软删除：写 tombstone 并标 dirty（向外传播删除）
    SoftDelete {
        kind: EntityKind,
        id: String,
        deleted_at: i64,
        respond_to: tokio::sync::oneshot::Sender<Result<()>>,
    },

    Get {
        kind: EntityKind,
        id: String,
        respond_to: tokio::sync::oneshot::Sender<Result<Option<AnyRecord>>>,
    },

    List {
        kind: EntityKind,
        include_deleted: bool,
        respond_to: tokio::sync::oneshot::Sender<Result<Vec<AnyRecord>>>,
    },

    ListByParent {
        kind: EntityKind,
        parent_id: String,
        include_deleted: bool,
        respond_to: tokio::sync::oneshot::Sender<Result<Vec<AnyRecord>>>,
    },

    /// 单一类型的 dirty 记录，优先级降序
    Dirty {
        kind: EntityKind,
        respond_to: tokio::sync::oneshot::Sender<Result<Vec<AnyRecord>>>,
    },

    /// 跨类型的全部 dirty 记录，优先级降序（同优先级顺序无保证）
    DirtyAll {
        respond_to: tokio::sync::oneshot::Sender<Result<Vec<AnyRecord>>>,
    },

    MarkDirty {
        kind: EntityKind,
        id: String,
        priority: SyncPriority,
        respond_to: tokio::sync::oneshot::Sender<Result<()>>,
    },

    /// 停止 Actor
    Shutdown,
}

/// 实体库 Actor（运行在独立线程）
pub struct StoreActor {
    conn: Connection,
    receiver: Receiver<StoreCommand>,
    thread_id: thread::ThreadId,
}

/// 数据库位置
pub enum StoreLocation {
    File(PathBuf),
    /// 测试用内存库
    Memory,
}

impl StoreActor {
    /// 打开数据库并启动 Actor 线程；返回命令入口与 JoinHandle。
    ///
    /// Connection 在调用线程打开并完成 migrate（失败能直接返回错误），
    /// 之后移交给专用线程，此后不再跨线程。
    pub fn spawn(location: StoreLocation) -> Result<(Sender<StoreCommand>, thread::JoinHandle<()>)> {
        let mut conn = match &location {
            StoreLocation::File(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                Connection::open(path)
                    .map_err(|e| FieldOpsSDKError::Database(format!("打开数据库失败: {}", e)))?
            }
            StoreLocation::Memory => Connection::open_in_memory()
                .map_err(|e| FieldOpsSDKError::Database(format!("打开内存数据库失败: {}", e)))?,
        };
        migrate::init_db(&mut conn)?;

        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name("fieldops-store".to_string())
            .spawn(move || {
                let actor = StoreActor {
                    conn,
                    receiver,
                    thread_id: thread::current().id(),
                };
                actor.run();
            })
            .map_err(|e| FieldOpsSDKError::Other(format!("启动 store 线程失败: {}", e)))?;

        Ok((sender, handle))
    }

    fn run(self) {
        info!("[Thread {:?}] StoreActor 已启动", self.thread_id);

        while let Ok(command) = self.receiver.recv() {
            match command {
                StoreCommand::Shutdown => {
                    info!("[Thread {:?}] StoreActor 收到停止信号", self.thread_id);
                    break;
                }
                StoreCommand::Save {
                    record,
                    priority,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_save(record, priority));
                }
                StoreCommand::ApplyPulled { record, respond_to } => {
                    let _ = respond_to.send(self.handle_apply_pulled(record));
                }
                StoreCommand::ConfirmPush {
                    kind,
                    local_id,
                    remote_id,
                    pushed,
                    synced_at,
                    respond_to,
                } => {
                    let _ = respond_to
                        .send(self.handle_confirm_push(kind, &local_id, &remote_id, &pushed, synced_at));
                }
                StoreCommand::SoftDelete {
                    kind,
                    id,
                    deleted_at,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_soft_delete(kind, &id, deleted_at));
                }
                StoreCommand::Get {
                    kind,
                    id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_get(kind, &id));
                }
                StoreCommand::List {
                    kind,
                    include_deleted,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_list(kind, include_deleted));
                }
                StoreCommand::ListByParent {
                    kind,
                    parent_id,
                    include_deleted,
                    respond_to,
                } => {
                    let _ =
                        respond_to.send(self.handle_list_by_parent(kind, &parent_id, include_deleted));
                }
                StoreCommand::Dirty { kind, respond_to } => {
                    let _ = respond_to.send(self.handle_dirty(kind));
                }
                StoreCommand::DirtyAll { respond_to } => {
                    let _ = respond_to.send(self.handle_dirty_all());
                }
                StoreCommand::MarkDirty {
                    kind,
                    id,
                    priority,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_mark_dirty(kind, &id, priority));
                }
            }
        }

        info!("[Thread {:?}] StoreActor 已停止", self.thread_id);
    }

    fn dao(&self, kind: EntityKind) -> RecordDao<'_> {
        RecordDao::new(&self.conn, kind.table())
    }

    /// 处理：本地变更落库
    fn handle_save(&self, mut record: AnyRecord, priority: SyncPriority) -> Result<String> {
        let kind = record.kind();
        if record.id().is_empty() {
            record.set_id(new_local_id());
        }
        let id = record.id().to_string();

        let dao = self.dao(kind);
        let existing = dao.get(&id)?;

        // 本地变更：dirty 置位，优先级只升不降；同步控制列继承既有值
        let (prev_priority, last_synced_at, deleted_at) = match &existing {
            Some(row) if row.needs_sync => (Some(row.sync_priority), row.last_synced_at, row.deleted_at),
            Some(row) => (None, row.last_synced_at, row.deleted_at),
            None => (None, None, None),
        };
        let effective_priority = match prev_priority {
            Some(prev) => prev.escalate(priority),
            None => priority,
        };

        let row = row_from_record(&record, true, effective_priority, last_synced_at, deleted_at)?;
        dao.upsert(&row)?;
        debug!(
            kind = kind.as_str(),
            id = %id,
            priority = effective_priority.name(),
            "本地变更已落库并标 dirty"
        );

        self.reproject_after_write(kind, &record)?;
        Ok(id)
    }

    /// 处理：应用拉取到的权威记录
    ///
    /// 冲突规则（整记录级，无字段级合并）：
    /// - 本地不存在 → 原样写入（authoritative）
    /// - 本地 dirty → 保留本地业务字段直到下次推送；但远端 deleted_at 非空时
    ///   无条件采纳（删除优先于未推送的编辑）
    /// - 本地干净 → 整记录覆盖，last_synced_at 单调推进
    ///
    /// 幂等：同一条远端记录应用两次，本地状态一致。
    fn handle_apply_pulled(&self, record: AnyRecord) -> Result<()> {
        let kind = record.kind();
        let id = record.id().to_string();
        let remote_deleted_at = record.meta().deleted_at;
        let now = chrono::Utc::now().timestamp_millis();

        let dao = self.dao(kind);
        match dao.get(&id)? {
            None => {
                let row = row_from_record(&record, false, SyncPriority::Normal, Some(now), remote_deleted_at)?;
                dao.upsert(&row)?;
            }
            Some(existing) if existing.needs_sync => {
                // 本地编辑在途：业务字段本地优先，删除除外
                if let Some(deleted_at) = remote_deleted_at {
                    if existing.deleted_at != Some(deleted_at) {
                        dao.set_deleted(&id, deleted_at)?;
                        debug!(
                            kind = kind.as_str(),
                            id = %id,
                            "远端软删除覆盖在途编辑（tombstone 采纳）"
                        );
                    }
                }
                return Ok(());
            }
            Some(existing) => {
                let synced_at = existing.last_synced_at.map_or(now, |prev| prev.max(now));
                let row =
                    row_from_record(&record, false, SyncPriority::Normal, Some(synced_at), remote_deleted_at)?;
                dao.upsert(&row)?;
            }
        }

        self.reproject_after_write(kind, &record)?;
        Ok(())
    }

    /// 处理：确认推送成功
    fn handle_confirm_push(
        &self,
        kind: EntityKind,
        local_id: &str,
        remote_id: &str,
        pushed: &AnyRecord,
        synced_at: i64,
    ) -> Result<()> {
        let dao = self.dao(kind);
        let Some(current) = dao.get(local_id)? else {
            warn!(
                kind = kind.as_str(),
                id = local_id,
                "确认推送时记录不存在（可能已被 rekey），忽略"
            );
            return Ok(());
        };

        // 首次推送：本地占位 id 换服务端 id，并修正全库引用
        if remote_id != local_id {
            dao.rekey(local_id, remote_id)?;
            // payload 里的 id 字段也要跟上（id 列才是权威，这里消除二者分叉）
            if let Some(row) = dao.get(remote_id)? {
                let record = record_from_row(kind, &row)?;
                dao.update_payload(remote_id, &record.to_payload()?)?;
            }
            self.rewrite_references(local_id, remote_id)?;
            info!(
                kind = kind.as_str(),
                local_id,
                remote_id,
                "首次推送完成，已采纳服务端 id"
            );
        }

        // 推送期间又被编辑过的记录保持 dirty，等下一轮把新版本推出去
        let pushed_payload = pushed.to_payload()?;
        if current.payload == pushed_payload {
            dao.clear_dirty(remote_id, synced_at)?;
        } else {
            dao.touch_synced(remote_id, synced_at)?;
            debug!(
                kind = kind.as_str(),
                id = remote_id,
                "推送确认时记录已有新编辑，保持 dirty"
            );
        }
        Ok(())
    }

    /// 处理：本地软删除
    fn handle_soft_delete(&self, kind: EntityKind, id: &str, deleted_at: i64) -> Result<()> {
        let dao = self.dao(kind);
        if !dao.set_deleted(id, deleted_at)? {
            return Err(FieldOpsSDKError::NotFound(format!(
                "{}:{} 不存在，无法删除",
                kind, id
            )));
        }
        // tombstone 要推送出去，删除按 High 排队
        dao.mark_dirty(id, SyncPriority::High)?;
        Ok(())
    }

    fn handle_get(&self, kind: EntityKind, id: &str) -> Result<Option<AnyRecord>> {
        match self.dao(kind).get(id)? {
            Some(row) => Ok(Some(record_from_row(kind, &row)?)),
            None => Ok(None),
        }
    }

    fn handle_list(&self, kind: EntityKind, include_deleted: bool) -> Result<Vec<AnyRecord>> {
        Ok(decode_rows(kind, self.dao(kind).list(include_deleted)?))
    }

    fn handle_list_by_parent(
        &self,
        kind: EntityKind,
        parent_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<AnyRecord>> {
        Ok(decode_rows(
            kind,
            self.dao(kind).list_by_parent(parent_id, include_deleted)?,
        ))
    }

    fn handle_dirty(&self, kind: EntityKind) -> Result<Vec<AnyRecord>> {
        Ok(decode_rows(kind, self.dao(kind).dirty()?))
    }

    fn handle_dirty_all(&self) -> Result<Vec<AnyRecord>> {
        let mut out = Vec::new();
        for kind in SYNC_ORDER {
            out.extend(decode_rows(kind, self.dao(kind).dirty()?));
        }
        // 稳定排序：只按优先级档位排，同档位之间不承诺顺序
        out.sort_by_key(|r| r.meta().sync_priority.value());
        Ok(out)
    }

    fn handle_mark_dirty(&self, kind: EntityKind, id: &str, priority: SyncPriority) -> Result<()> {
        if !self.dao(kind).mark_dirty(id, priority)? {
            return Err(FieldOpsSDKError::NotFound(format!("{}:{} 不存在", kind, id)));
        }
        Ok(())
    }

    /// 写入后的投影维护：项目或事件发生变化时重算该项目事件的 active 缓存。
    fn reproject_after_write(&self, kind: EntityKind, record: &AnyRecord) -> Result<()> {
        let project_id = match (kind, record) {
            (EntityKind::Project, AnyRecord::Project(p)) => p.id.clone(),
            (EntityKind::CalendarEvent, AnyRecord::CalendarEvent(e)) => e.project_id.clone(),
            _ => return Ok(()),
        };
        self.recompute_project_events(&project_id)
    }

    /// 重算指定项目全部事件的 active 位；派生写入不动同步控制列。
    fn recompute_project_events(&self, project_id: &str) -> Result<()> {
        let project = match self.dao(EntityKind::Project).get(project_id)? {
            Some(row) => match record_from_row(EntityKind::Project, &row)? {
                AnyRecord::Project(p) => p,
                _ => return Ok(()),
            },
            // 父项目还没拉到（比如事件先于项目落库），等项目到位时再重算
            None => return Ok(()),
        };

        let dao = self.dao(EntityKind::CalendarEvent);
        let rows = dao.list_by_parent(project_id, false)?;
        let mut events: Vec<CalendarEvent> = Vec::with_capacity(rows.len());
        for row in &rows {
            match record_from_row(EntityKind::CalendarEvent, row)? {
                AnyRecord::CalendarEvent(e) => events.push(e),
                _ => {}
            }
        }

        let before: Vec<Option<bool>> = events.iter().map(|e| e.active).collect();
        projector::recompute_active(&project, &mut events);
        for (event, old_active) in events.iter().zip(before) {
            if event.active != old_active {
                let payload = AnyRecord::CalendarEvent(event.clone()).to_payload()?;
                dao.update_payload(&event.id, &payload)?;
            }
        }
        Ok(())
    }

    /// 全库引用修正：把 old_id 换成 new_id（类型化替换，LIKE 仅做预过滤）。
    fn rewrite_references(&self, old_id: &str, new_id: &str) -> Result<()> {
        for kind in SYNC_ORDER {
            let dao = self.dao(kind);
            for row in dao.payload_containing(old_id)? {
                let mut record = match record_from_row(kind, &row) {
                    Ok(r) => r,
                    Err(e) => {
                        error!(kind = kind.as_str(), id = %row.id, "引用修正时解码失败: {}", e);
                        continue;
                    }
                };
                if record.replace_ref(old_id, new_id) {
                    let new_row = RecordRow {
                        parent_id: record.parent_id().map(String::from),
                        payload: record.to_payload()?,
                        ..row
                    };
                    dao.upsert(&new_row)?;
                    debug!(
                        kind = kind.as_str(),
                        id = %new_row.id,
                        old_id,
                        new_id,
                        "已修正对新服务端 id 的引用"
                    );
                }
            }
        }
        Ok(())
    }
}

/// 行 → 记录（meta 由列值回填；id 以列值为准，payload 里的旧 id 不作数）
pub(crate) fn record_from_row(kind: EntityKind, row: &RecordRow) -> Result<AnyRecord> {
    let mut record = AnyRecord::from_payload(kind, &row.payload)
        .map_err(|e| FieldOpsSDKError::Database(format!("payload 解码失败 {}:{}: {}", kind, row.id, e)))?;
    record.set_id(row.id.clone());
    let meta = record.meta_mut();
    meta.needs_sync = row.needs_sync;
    meta.sync_priority = row.sync_priority;
    meta.last_synced_at = row.last_synced_at;
    meta.deleted_at = row.deleted_at;
    Ok(record)
}

/// 记录 → 行（同步控制列由调用方给定）
fn row_from_record(
    record: &AnyRecord,
    needs_sync: bool,
    priority: SyncPriority,
    last_synced_at: Option<i64>,
    deleted_at: Option<i64>,
) -> Result<RecordRow> {
    Ok(RecordRow {
        id: record.id().to_string(),
        parent_id: record.parent_id().map(String::from),
        needs_sync,
        sync_priority: priority,
        last_synced_at,
        deleted_at,
        payload: record.to_payload()?,
    })
}

/// 批量解码；单条坏 payload 记日志跳过，不拖垮整个查询
fn decode_rows(kind: EntityKind, rows: Vec<RecordRow>) -> Vec<AnyRecord> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match record_from_row(kind, &row) {
            Ok(r) => out.push(r),
            Err(e) => error!(kind = kind.as_str(), id = %row.id, "跳过损坏记录: {}", e),
        }
    }
    out
}

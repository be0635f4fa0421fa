//! 排期模式状态机与 active 缓存投影
//!
//! 每个项目在 {ProjectMode, TaskMode} 之间流转（由 event_type 派生，缺省
//! ProjectMode）。进入 ProjectMode：该项目所有 project 级事件 active=true、
//! task 级事件 active=false；进入 TaskMode 相反。
//!
//! 不变式：任一项目的事件集合里，active=true 的层级与
//! effective_event_mode 一致，且两个层级不会同时激活。
//!
//! active 是本地缓存的投影位，重算不标 dirty（派生数据不进推送队列）。

use chrono::Utc;
use tracing::debug;

use crate::storage::dirty::SyncPriority;
use crate::storage::entities::{
    new_local_id, CalendarEvent, EventCategory, EventMode, Project, ProjectTask, SyncMeta,
};

/// 按父项目当前排期模式重算一批事件的 active 位，返回发生变化的条数。
///
/// store actor 在项目模式变化、事件新建/改挂时调用；同一写线程内完成，
/// 调用结束即恢复不变式。
pub fn recompute_active(project: &Project, events: &mut [CalendarEvent]) -> usize {
    let mode = project.effective_event_mode();
    let mut changed = 0;
    for event in events.iter_mut() {
        if event.project_id != project.id {
            continue;
        }
        let next = event.effective_category().active_under(mode);
        if event.active != Some(next) {
            event.active = Some(next);
            changed += 1;
        }
    }
    if changed > 0 {
        debug!(
            project_id = %project.id,
            mode = mode.as_str(),
            changed,
            "重算日历事件 active 缓存"
        );
    }
    changed
}

/// 事件是否应当显示：
/// 1. 先看缓存 active 位
/// 2. 缓存缺失时按父项目实时重算
/// 3. 父项目解析不到时退化为「只显示 project 级事件」（避免双份显示）
pub fn should_display(event: &CalendarEvent, parent: Option<&Project>) -> bool {
    if let Some(active) = event.active {
        return active;
    }
    match parent {
        Some(project) => event
            .effective_category()
            .active_under(project.effective_event_mode()),
        None => event.effective_category() == EventCategory::Project,
    }
}

impl CalendarEvent {
    /// 从项目派生 project 级事件；项目没有 start_date 时不派生。
    ///
    /// 颜色回退链：项目色 → 公司默认色；标题用客户可见名称。
    pub fn from_project(project: &Project, company_default_color: Option<&str>) -> Option<Self> {
        let start = project.start_date?;
        let now = Utc::now().timestamp_millis();
        Some(Self {
            id: new_local_id(),
            project_id: project.id.clone(),
            task_id: None,
            category: Some(EventCategory::Project),
            title: project.client_facing_name().to_string(),
            color: project
                .color
                .clone()
                .or_else(|| company_default_color.map(String::from)),
            start_date: Some(start),
            end_date: project.effective_end_date(),
            active: Some(project.effective_event_mode() == EventMode::Project),
            created_at: now,
            updated_at: now,
            meta: SyncMeta {
                needs_sync: true,
                sync_priority: SyncPriority::High,
                ..Default::default()
            },
        })
    }

    /// 从任务派生 task 级事件；标题缺省用父项目的客户可见名称。
    pub fn from_task(
        task: &ProjectTask,
        project: &Project,
        start_date: i64,
        end_date: Option<i64>,
    ) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: new_local_id(),
            project_id: task.project_id.clone(),
            task_id: Some(task.id.clone()),
            category: Some(EventCategory::Task),
            title: project.client_facing_name().to_string(),
            color: project.color.clone(),
            start_date: Some(start_date),
            end_date,
            active: Some(project.effective_event_mode() == EventMode::Task),
            created_at: now,
            updated_at: now,
            meta: SyncMeta {
                needs_sync: true,
                sync_priority: SyncPriority::High,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(mode: Option<EventMode>) -> Project {
        Project {
            id: "p-1".into(),
            company_id: "co-1".into(),
            name: "Driveway".into(),
            display_name: Some("Smith residence".into()),
            start_date: Some(1_750_000_000_000),
            event_type: mode,
            ..Default::default()
        }
    }

    fn events() -> Vec<CalendarEvent> {
        vec![
            CalendarEvent {
                id: "e-p".into(),
                project_id: "p-1".into(),
                ..Default::default()
            },
            CalendarEvent {
                id: "e-t1".into(),
                project_id: "p-1".into(),
                task_id: Some("t-1".into()),
                ..Default::default()
            },
            CalendarEvent {
                id: "e-t2".into(),
                project_id: "p-1".into(),
                task_id: Some("t-2".into()),
                ..Default::default()
            },
        ]
    }

    fn assert_invariant(events: &[CalendarEvent], mode: EventMode) {
        // 不变式：active=true 的层级与模式一致，两层级互斥
        for e in events {
            let expected = e.effective_category().active_under(mode);
            assert_eq!(e.active, Some(expected), "event {}", e.id);
        }
    }

    #[test]
    fn test_project_mode_activates_project_level_only() {
        let p = project(None); // 缺省 ProjectMode
        let mut evs = events();
        recompute_active(&p, &mut evs);
        assert_invariant(&evs, EventMode::Project);
        assert_eq!(evs[0].active, Some(true));
        assert_eq!(evs[1].active, Some(false));
    }

    #[test]
    fn test_task_mode_flips_active_levels() {
        let p = project(Some(EventMode::Task));
        let mut evs = events();
        recompute_active(&p, &mut evs);
        assert_invariant(&evs, EventMode::Task);
        assert_eq!(evs[0].active, Some(false));
        assert_eq!(evs[1].active, Some(true));
        assert_eq!(evs[2].active, Some(true));
    }

    #[test]
    fn test_mode_switch_recompute_counts_changes() {
        let mut evs = events();
        assert_eq!(recompute_active(&project(None), &mut evs), 3);
        // 再算一遍不应有变化（幂等）
        assert_eq!(recompute_active(&project(None), &mut evs), 0);
        // 切到 TaskMode 全部翻转
        assert_eq!(recompute_active(&project(Some(EventMode::Task)), &mut evs), 3);
    }

    #[test]
    fn test_recompute_ignores_other_projects_events() {
        let mut evs = vec![CalendarEvent {
            id: "e-x".into(),
            project_id: "p-OTHER".into(),
            ..Default::default()
        }];
        assert_eq!(recompute_active(&project(None), &mut evs), 0);
        assert_eq!(evs[0].active, None);
    }

    #[test]
    fn test_should_display_prefers_cache() {
        let mut e = CalendarEvent {
            project_id: "p-1".into(),
            task_id: Some("t-1".into()),
            active: Some(true),
            ..Default::default()
        };
        // 缓存说显示就显示，即使父项目模式不一致（等待下一次重算修正）
        assert!(should_display(&e, Some(&project(None))));
        e.active = Some(false);
        assert!(!should_display(&e, Some(&project(Some(EventMode::Task)))));
    }

    #[test]
    fn test_should_display_falls_back_to_live_recompute() {
        let e = CalendarEvent {
            project_id: "p-1".into(),
            task_id: Some("t-1".into()),
            active: None,
            ..Default::default()
        };
        assert!(!should_display(&e, Some(&project(None))));
        assert!(should_display(&e, Some(&project(Some(EventMode::Task)))));
    }

    #[test]
    fn test_should_display_unresolved_parent_shows_project_level_only() {
        let project_level = CalendarEvent {
            project_id: "p-1".into(),
            active: None,
            ..Default::default()
        };
        let task_level = CalendarEvent {
            project_id: "p-1".into(),
            task_id: Some("t-1".into()),
            active: None,
            ..Default::default()
        };
        assert!(should_display(&project_level, None));
        assert!(!should_display(&task_level, None));
    }

    #[test]
    fn test_from_project_requires_start_date() {
        let mut p = project(None);
        p.start_date = None;
        assert!(CalendarEvent::from_project(&p, None).is_none());
    }

    #[test]
    fn test_from_project_builds_active_project_event() {
        let p = project(None);
        let e = CalendarEvent::from_project(&p, Some("#445566")).unwrap();
        assert_eq!(e.effective_category(), EventCategory::Project);
        assert_eq!(e.title, "Smith residence");
        // 项目没配色时回退公司默认色
        assert_eq!(e.color.as_deref(), Some("#445566"));
        assert_eq!(e.active, Some(true));
        assert!(e.meta.needs_sync);
    }

    #[test]
    fn test_from_task_titles_with_client_facing_name() {
        let p = project(Some(EventMode::Task));
        let t = ProjectTask {
            id: "t-1".into(),
            project_id: "p-1".into(),
            name: "Excavation".into(),
            ..Default::default()
        };
        let e = CalendarEvent::from_task(&t, &p, 1_750_000_000_000, None);
        assert_eq!(e.task_id.as_deref(), Some("t-1"));
        assert_eq!(e.effective_category(), EventCategory::Task);
        assert_eq!(e.title, "Smith residence");
        assert_eq!(e.active, Some(true));
    }
}

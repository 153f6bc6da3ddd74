//! 采集线程 → UI线程的投递通道
//!
//! - 帧: 有界通道, 满了丢最旧的一帧 (drop-oldest), UI每帧只取最新一帧
//! - 事件: 无界通道, 从不丢弃

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::detection::Counts;
use crate::input::{Frame, MediaKind};

/// 一帧显示数据; `counts` 为 None 表示计数不变
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub generation: u64,
    pub frame: Frame,
    pub counts: Option<Counts>,
}

/// 采集线程的控制事件
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// 流结束 (文件播完 / 摄像头断开)
    EndOfStream { generation: u64, kind: MediaKind },
    /// 推理失败, 预测已关闭
    InferenceFailed { generation: u64, reason: String },
    /// 读帧出错, 采集线程已退出
    SourceError {
        generation: u64,
        kind: MediaKind,
        reason: String,
    },
}

impl UiEvent {
    pub fn generation(&self) -> u64 {
        match self {
            UiEvent::EndOfStream { generation, .. }
            | UiEvent::InferenceFailed { generation, .. }
            | UiEvent::SourceError { generation, .. } => *generation,
        }
    }
}

/// 生产端 (采集线程持有)
#[derive(Clone)]
pub struct UiSink {
    frame_tx: Sender<FramePayload>,
    // 用于丢弃最旧帧
    frame_drain: Receiver<FramePayload>,
    event_tx: Sender<UiEvent>,
}

/// 消费端 (UI线程持有)
pub struct UiInbox {
    frame_rx: Receiver<FramePayload>,
    event_rx: Receiver<UiEvent>,
}

/// 创建投递通道, 帧队列容量至少为1
pub fn dispatch_channel(capacity: usize) -> (UiSink, UiInbox) {
    let (frame_tx, frame_rx) = crossbeam_channel::bounded(capacity.max(1));
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    (
        UiSink {
            frame_tx,
            frame_drain: frame_rx.clone(),
            event_tx,
        },
        UiInbox { frame_rx, event_rx },
    )
}

impl UiSink {
    /// 投递一帧, 队列满时丢弃最旧的一帧; 被丢弃帧的计数会并入新帧
    pub fn post_frame(&self, payload: FramePayload) {
        let mut payload = payload;
        loop {
            match self.frame_tx.try_send(payload) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    payload = back;
                    if let Ok(old) = self.frame_drain.try_recv() {
                        coalesce_counts(&mut payload, old);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn post_event(&self, event: UiEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl UiInbox {
    /// 取出队列中所有帧, 只返回最新一帧
    pub fn latest_frame(&self) -> Option<FramePayload> {
        let mut latest: Option<FramePayload> = None;
        for payload in self.frame_rx.try_iter() {
            let mut payload = payload;
            if let Some(old) = latest.take() {
                coalesce_counts(&mut payload, old);
            }
            latest = Some(payload);
        }
        latest
    }

    /// 取出所有待处理事件 (按发送顺序)
    pub fn events(&self) -> Vec<UiEvent> {
        self.event_rx.try_iter().collect()
    }
}

/// 同一采集线程的旧计数在新帧没有计数时保留
fn coalesce_counts(newer: &mut FramePayload, older: FramePayload) {
    if newer.counts.is_none() && older.generation == newer.generation {
        newer.counts = older.counts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;

    fn payload(generation: u64, seq: u64, counts: Option<&[(&str, usize)]>) -> FramePayload {
        FramePayload {
            generation,
            frame: Frame {
                seq,
                image: Arc::new(RgbImage::new(2, 2)),
            },
            counts: counts.map(|c| c.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
        }
    }

    #[test]
    fn test_drop_oldest_keeps_latest() {
        let (sink, inbox) = dispatch_channel(1);
        for seq in 1..=5 {
            sink.post_frame(payload(1, seq, None));
        }
        let latest = inbox.latest_frame().unwrap();
        assert_eq!(latest.frame.seq, 5);
        assert!(inbox.latest_frame().is_none());
    }

    #[test]
    fn test_frames_stay_in_order() {
        let (sink, inbox) = dispatch_channel(8);
        for seq in 1..=3 {
            sink.post_frame(payload(1, seq, None));
        }
        assert_eq!(inbox.latest_frame().unwrap().frame.seq, 3);
    }

    #[test]
    fn test_dropped_counts_carry_over() {
        let (sink, inbox) = dispatch_channel(1);
        sink.post_frame(payload(1, 1, Some(&[("person", 2)])));
        sink.post_frame(payload(1, 2, None));
        let latest = inbox.latest_frame().unwrap();
        assert_eq!(latest.frame.seq, 2);
        assert_eq!(latest.counts.unwrap()["person"], 2);

        // 新计数覆盖旧计数
        sink.post_frame(payload(1, 3, Some(&[("car", 1)])));
        sink.post_frame(payload(1, 4, Some(&[("bus", 1)])));
        let counts = inbox.latest_frame().unwrap().counts.unwrap();
        assert!(counts.contains_key("bus"));
        assert!(!counts.contains_key("car"));
    }

    #[test]
    fn test_counts_not_merged_across_generations() {
        let (sink, inbox) = dispatch_channel(4);
        sink.post_frame(payload(1, 1, Some(&[("person", 1)])));
        sink.post_frame(payload(2, 1, None));
        let latest = inbox.latest_frame().unwrap();
        assert_eq!(latest.generation, 2);
        assert!(latest.counts.is_none());
    }

    #[test]
    fn test_events_never_dropped() {
        let (sink, inbox) = dispatch_channel(1);
        for g in 0..100 {
            sink.post_event(UiEvent::InferenceFailed {
                generation: g,
                reason: "x".into(),
            });
        }
        sink.post_event(UiEvent::EndOfStream {
            generation: 100,
            kind: MediaKind::Video,
        });
        let events = inbox.events();
        assert_eq!(events.len(), 101);
        assert_eq!(events[0].generation(), 0);
        assert_eq!(events[100].generation(), 100);
        assert!(inbox.events().is_empty());
    }
}

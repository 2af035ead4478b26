//! 接收缓冲区
//!
//! 固定容量、只追加的字节区，带读游标 `cursor` 与填充长度 `filled`。
//! 不变量：`cursor <= filled <= capacity`。已消费的字节在每轮解析后通过
//! `compact()` 移出。

/// 接收缓冲区
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: Box<[u8]>,
    cursor: usize,
    filled: usize,
}

impl ReceiveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// 未消费的字节数
    pub fn len(&self) -> usize {
        self.filled - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == self.filled
    }

    /// 尾部还能追加的字节数
    pub fn free(&self) -> usize {
        self.capacity() - self.filled
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.capacity()
    }

    /// 追加尽可能多的字节，返回实际追加的数量
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        self.data[self.filled..self.filled + n].copy_from_slice(&bytes[..n]);
        self.filled += n;
        n
    }

    /// 未消费的字节
    pub fn unread(&self) -> &[u8] {
        &self.data[self.cursor..self.filled]
    }

    /// 前 `n` 个未消费字节，不足时返回 `None`
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        (self.len() >= n).then(|| &self.data[self.cursor..self.cursor + n])
    }

    /// 消费 `n` 个字节（超出部分被截断）
    pub fn consume(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.filled);
    }

    /// 回退游标 `n` 个字节（不会越过本轮压缩前的起点）
    pub fn rewind(&mut self, n: usize) {
        self.cursor = self.cursor.saturating_sub(n);
    }

    /// 将未消费字节移到缓冲区头部
    pub fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.data.copy_within(self.cursor..self.filled, 0);
        self.filled -= self.cursor;
        self.cursor = 0;
    }

    /// 丢弃全部内容
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.filled = 0;
    }
}

//! 通知器优先级排序
//!
//! 两两比较规则：
//! 1. 显式优先级不同时，数值小的先执行（进入时先执行，退出时最后执行）
//! 2. 同一切面内：任一方是后置类通知时，声明靠后的优先；否则声明靠前的优先
//! 3. 其余情况不约束，保持输入顺序
//!
//! 规则只构成偏序，用拓扑排序求出一致的全序。出现环时剩余部分退回输入顺序。

use crate::advisor::{Advisor, AspectMetadata};
use std::cmp::Ordering;

/// 比较两个通知器的优先级，`Less` 表示 `a` 先执行
pub fn compare(a: &Advisor, b: &Advisor) -> Ordering {
    let by_order = a.effective_order().cmp(&b.effective_order());
    if by_order != Ordering::Equal {
        return by_order;
    }
    match (a.aspect(), b.aspect()) {
        (Some(x), Some(y)) if x.aspect_name == y.aspect_name => compare_declarations(x, y),
        _ => Ordering::Equal,
    }
}

fn compare_declarations(x: &AspectMetadata, y: &AspectMetadata) -> Ordering {
    if x.advice_type.is_after() || y.advice_type.is_after() {
        y.declaration_order.cmp(&x.declaration_order)
    } else {
        x.declaration_order.cmp(&y.declaration_order)
    }
}

/// 偏序排序
///
/// 每一步选出输入中最靠前、且没有未放置前驱的元素，因此排序稳定且幂等。
/// 找不到这样的元素说明约束成环，剩余元素按输入顺序追加。
pub fn partial_order_sort<T, F>(items: Vec<T>, cmp: F) -> Vec<T>
where
    F: Fn(&T, &T) -> Ordering,
{
    let n = items.len();
    if n < 2 {
        return items;
    }

    let mut pending = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            match cmp(&items[i], &items[j]) {
                Ordering::Less => {
                    successors[i].push(j);
                    pending[j] += 1;
                }
                Ordering::Greater => {
                    successors[j].push(i);
                    pending[i] += 1;
                }
                Ordering::Equal => {}
            }
        }
    }

    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        match (0..n).find(|&i| !placed[i] && pending[i] == 0) {
            Some(i) => {
                placed[i] = true;
                order.push(i);
                for &j in &successors[i] {
                    pending[j] -= 1;
                }
            }
            None => {
                tracing::warn!(
                    "Precedence constraints form a cycle among {} elements, keeping their input order",
                    n - order.len()
                );
                order.extend((0..n).filter(|&i| !placed[i]));
                break;
            }
        }
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// 按优先级排序通知器
pub fn sort_advisors(advisors: Vec<Advisor>) -> Vec<Advisor> {
    partial_order_sort(advisors, compare)
}

/// 按关联通知器的优先级排序任意元素
pub fn sort_by_precedence<T, F>(items: Vec<T>, advisor_of: F) -> Vec<T>
where
    F: Fn(&T) -> &Advisor,
{
    partial_order_sort(items, |a, b| compare(advisor_of(a), advisor_of(b)))
}

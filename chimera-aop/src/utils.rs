//! 工具函数

/// 类型与方法名的通配符匹配
pub mod pattern {
    /// 通配符匹配，`*` 匹配任意长度的字符
    ///
    /// # 示例
    ///
    /// ```
    /// use chimera_aop::utils::pattern::simple_match;
    ///
    /// assert!(simple_match("*", "anything"));
    /// assert!(simple_match("save*", "saveUser"));
    /// assert!(simple_match("*Service", "UserService"));
    /// assert!(simple_match("*Serv*ce", "UserServiceImplce"));
    /// assert!(!simple_match("load*", "saveUser"));
    /// ```
    pub fn simple_match(pattern: &str, text: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 1 {
            return pattern == text;
        }

        let first = parts[0];
        let last = parts[parts.len() - 1];
        if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last) {
            return false;
        }

        let mut rest = &text[first.len()..text.len() - last.len()];
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match rest.find(part) {
                Some(index) => rest = &rest[index + part.len()..],
                None => return false,
            }
        }
        true
    }

    /// 任一模式匹配即返回 true
    pub fn any_match<S: AsRef<str>>(patterns: &[S], text: &str) -> bool {
        patterns.iter().any(|p| simple_match(p.as_ref(), text))
    }
}

/// 通知器适用性判断
pub mod advisors {
    use crate::advisor::Advisor;
    use crate::metadata::ClassInfo;
    use crate::method_matcher::matches_static;

    /// 是否存在作用于 `class` 的引介通知器
    pub fn has_matching_introductions(advisors: &[Advisor], class: &ClassInfo) -> bool {
        advisors.iter().any(|advisor| match advisor {
            Advisor::Introduction(intro) => intro.class_filter().matches(class),
            Advisor::Pointcut(_) => false,
        })
    }

    /// 通知器是否可能作用于 `class` 的至少一个方法
    pub fn can_apply(advisor: &Advisor, class: &ClassInfo, has_introductions: bool) -> bool {
        match advisor {
            Advisor::Introduction(intro) => intro.class_filter().matches(class),
            Advisor::Pointcut(pa) => {
                let pointcut = pa.pointcut();
                if !pointcut.class_filter().matches(class) {
                    return false;
                }
                let matcher = pointcut.method_matcher();
                class
                    .all_methods()
                    .iter()
                    .any(|method| matches_static(matcher.as_ref(), method, Some(class), has_introductions))
            }
        }
    }

    /// 筛选出能作用于 `class` 的通知器
    ///
    /// 先判断引介通知器，其余通知器据此得知该类型是否带有引介接口
    pub fn find_advisors_that_can_apply(candidates: &[Advisor], class: &ClassInfo) -> Vec<Advisor> {
        let mut eligible: Vec<Advisor> = candidates
            .iter()
            .filter(|a| a.is_introduction() && can_apply(a, class, false))
            .cloned()
            .collect();
        let has_introductions = !eligible.is_empty();

        eligible.extend(
            candidates
                .iter()
                .filter(|a| !a.is_introduction() && can_apply(a, class, has_introductions))
                .cloned(),
        );
        eligible
    }
}

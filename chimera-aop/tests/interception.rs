mod common;

use chimera_aop::interceptor::DelegatingIntroductionInterceptor;
use chimera_aop::method_matcher::{ArgumentsMethodMatcher, NameMatchMethodMatcher};
use chimera_aop::prelude::*;
use chimera_aop::{
    precedence, AdvisorAdapterRegistry, ChainElement, ComposablePointcut, CustomAdvice,
    DefaultAdvisorChainFactory, AdvisorChainFactory, PoolingTargetSource, TargetSource,
};
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn factory(journal: &Journal) -> ProxyFactory {
    ProxyFactory::new(UserServiceImpl::new(journal.clone()), user_class()).interface(USER_SERVICE)
}

fn recording_around(journal: &Journal, label: &'static str) -> Advice {
    let journal = journal.clone();
    Advice::around(interceptor_fn(label, move |invocation| {
        journal.push(format!("enter:{}", label));
        let result = invocation.proceed();
        journal.push(format!("exit:{}", label));
        result
    }))
}

#[test]
fn resolved_order_is_deterministic_across_calls() {
    init_tracing();
    let journal = Journal::default();
    let factory = factory(&journal);
    for (label, order) in [("c", 3), ("a", 1), ("b", 2)] {
        factory
            .add_advisor(Advisor::always(recording_around(&journal, label)).with_order(order))
            .unwrap();
    }
    let proxy = factory.get_handle().unwrap();

    for _ in 0..5 {
        journal.clear();
        proxy.call(&save(), vec![Value::new(1)]).unwrap();
        assert_eq!(
            journal.entries(),
            vec!["enter:a", "enter:b", "enter:c", "real:save", "exit:c", "exit:b", "exit:a"]
        );
    }
}

#[test]
fn exits_happen_in_reverse_order_of_entries() {
    init_tracing();
    let journal = Journal::default();
    let factory = factory(&journal);
    let before_journal = journal.clone();
    factory
        .add_advisor(
            Advisor::always(Advice::before(before_fn(move |_| {
                before_journal.push("before");
                Ok(())
            })))
            .with_order(0),
        )
        .unwrap();
    factory
        .add_advisor(Advisor::always(recording_around(&journal, "outer")).with_order(1))
        .unwrap();
    factory
        .add_advisor(Advisor::always(recording_around(&journal, "inner")).with_order(2))
        .unwrap();

    let proxy = factory.get_handle().unwrap();
    let value = proxy.call(&save(), vec![Value::new(7)]).unwrap();
    assert_eq!(id(&value), 7);
    assert_eq!(
        journal.entries(),
        vec!["before", "enter:outer", "enter:inner", "real:save", "exit:inner", "exit:outer"]
    );
}

#[test]
fn later_after_advice_in_same_aspect_takes_precedence() {
    let aspect = AspectDefinition::new("Audit")
        .after(PointcutExpression::All, |_| Ok(()))
        .after(PointcutExpression::All, |_| Ok(()));

    let sorted = precedence::sort_advisors(aspect.advisors());
    let declared: Vec<u32> = sorted.iter().map(|a| a.aspect().unwrap().declaration_order).collect();
    assert_eq!(declared, vec![1, 0]);

    let resorted = precedence::sort_advisors(sorted.clone());
    let again: Vec<u32> = resorted.iter().map(|a| a.aspect().unwrap().declaration_order).collect();
    assert_eq!(again, declared);
}

#[test]
fn sorting_is_idempotent_for_mixed_advisors() {
    let aspect = AspectDefinition::new("Mixed")
        .before(PointcutExpression::All, |_| Ok(()))
        .after(PointcutExpression::All, |_| Ok(()))
        .around(PointcutExpression::All, interceptor_fn("timing", |inv| inv.proceed()))
        .after_returning(PointcutExpression::All, |_, _| Ok(()));
    let mut advisors = aspect.advisors();
    advisors.push(Advisor::always(Advice::before(before_fn(|_| Ok(())))).with_order(-5));
    advisors.push(Advisor::always(Advice::before(before_fn(|_| Ok(())))));

    let once = precedence::sort_advisors(advisors);
    let twice = precedence::sort_advisors(once.clone());
    let describe = |advisors: &[Advisor]| -> Vec<String> {
        advisors
            .iter()
            .map(|a| format!("{}:{:?}", a.describe(), a.aspect().map(|m| m.declaration_order)))
            .collect()
    };
    assert_eq!(describe(&once[..]), describe(&twice[..]));
    assert_eq!(once[0].order(), Some(-5));
}

#[test]
fn after_advice_runs_last_for_before_and_after_in_one_aspect() {
    init_tracing();
    let journal = Journal::default();
    let factory = factory(&journal);
    let before_journal = journal.clone();
    let after_journal = journal.clone();
    let aspect = AspectDefinition::new("X")
        .before(PointcutExpression::execution("* UserService.*(..)"), move |_| {
            before_journal.push("beforeLog-enter");
            Ok(())
        })
        .after(PointcutExpression::execution("* UserService.*(..)"), move |_| {
            after_journal.push("afterAudit-run");
            Ok(())
        });
    for advisor in aspect.advisors() {
        factory.add_advisor(advisor).unwrap();
    }

    let proxy = factory.get_handle().unwrap();
    proxy.call(&save(), vec![Value::new(1)]).unwrap();
    assert_eq!(journal.entries(), vec!["beforeLog-enter", "real:save", "afterAudit-run"]);
}

#[test]
fn name_matcher_applies_to_save_but_not_load() {
    init_tracing();
    let journal = Journal::default();
    let pointcut = ComposablePointcut::from_method_matcher(Arc::new(NameMatchMethodMatcher::new(["save"])));
    let before_journal = journal.clone();
    let advisor = Advisor::new(
        Arc::new(pointcut),
        Advice::before(before_fn(move |inv| {
            before_journal.push(format!("advised:{}", inv.method().name()));
            Ok(())
        })),
    );

    let resolver = DefaultAdvisorChainFactory::new();
    let class = user_class();
    assert_eq!(resolver.resolve(&[advisor.clone()], &save(), Some(&*class)).unwrap().chain.len(), 1);
    assert!(resolver.resolve(&[advisor.clone()], &load(), Some(&*class)).unwrap().is_empty());

    let factory = factory(&journal);
    factory.add_advisor(advisor).unwrap();
    let proxy = factory.get_handle().unwrap();
    proxy.call(&save(), vec![Value::new(1)]).unwrap();
    proxy.call(&load(), vec![Value::new(1)]).unwrap();
    assert_eq!(journal.entries(), vec!["advised:save", "real:save", "real:load"]);
}

#[test]
fn dynamic_matcher_is_evaluated_per_call() {
    init_tracing();
    let journal = Journal::default();
    let matcher = ArgumentsMethodMatcher::new(Arc::new(NameMatchMethodMatcher::new(["save"])), |_, args| {
        args.first().map(id).map_or(false, |value| value > 10)
    });
    let guard_journal = journal.clone();
    let advisor = Advisor::new(
        Arc::new(ComposablePointcut::from_method_matcher(Arc::new(matcher))),
        Advice::before(before_fn(move |inv| {
            guard_journal.push(format!("guard:{}", id(&inv.arguments()[0])));
            Ok(())
        })),
    );

    let resolved = DefaultAdvisorChainFactory::new()
        .resolve(&[advisor.clone()], &save(), Some(&*user_class()))
        .unwrap();
    assert!(!resolved.cacheable);
    assert!(matches!(resolved.chain[0], ChainElement::Dynamic { .. }));

    let factory = factory(&journal);
    factory.add_advisor(advisor).unwrap();
    let proxy = factory.get_handle().unwrap();
    for value in [5, 20, 5] {
        proxy.call(&save(), vec![Value::new(value)]).unwrap();
    }
    assert_eq!(
        journal.entries(),
        vec!["real:save", "guard:20", "real:save", "real:save"]
    );
    assert_eq!(proxy.advised().unwrap().cached_chain_count(), 0);
}

#[test]
fn cloned_invocations_proceed_independently() {
    init_tracing();
    let journal = Journal::default();
    let target = UserServiceImpl::new(journal.clone());
    let factory = ProxyFactory::new(target.clone(), user_class()).interface(USER_SERVICE);
    factory
        .add_advice(Advice::around(interceptor_fn("fork", |invocation| {
            let mut fork = invocation.invocable_clone();
            fork.set_argument(0, Value::new(2));
            invocation.set_argument(0, Value::new(1));
            let forked = fork.proceed()?;
            let original = invocation.proceed()?;
            Ok(Value::new((id(&forked), id(&original))))
        })))
        .unwrap();

    let proxy = factory.get_handle().unwrap();
    let value = proxy.call(&save(), vec![Value::new(0)]).unwrap();
    assert_eq!(value.downcast_ref::<(i32, i32)>(), Some(&(2, 1)));
    assert_eq!(target.calls(), 2);
}

struct CountingTargetSource {
    target: Target,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl TargetSource for CountingTargetSource {
    fn target_class(&self) -> Option<chimera_aop::ClassRef> {
        Some(user_class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Target>> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.target.clone()))
    }

    fn release_target(&self, _target: Target) -> anyhow::Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn targets_are_released_on_every_exit_path() {
    init_tracing();
    let journal = Journal::default();
    let source = Arc::new(CountingTargetSource {
        target: UserServiceImpl::new(journal.clone()),
        acquired: AtomicUsize::new(0),
        released: AtomicUsize::new(0),
    });
    let factory = ProxyFactory::with_target_source(source.clone()).interface(USER_SERVICE);
    factory
        .add_advice(Advice::before(before_fn(|inv| {
            if id(&inv.arguments()[0]) < 0 {
                anyhow::bail!("negative id rejected");
            }
            Ok(())
        })))
        .unwrap();
    let proxy = factory.get_handle().unwrap();

    assert!(proxy.call(&save(), vec![Value::new(1)]).is_ok());
    assert!(proxy.call(&method("fail"), vec![Value::new(1)]).is_err());
    assert!(proxy.call(&save(), vec![Value::new(-1)]).is_err());

    assert_eq!(source.acquired.load(Ordering::SeqCst), 3);
    assert_eq!(source.released.load(Ordering::SeqCst), 3);
}

#[test]
fn pooled_targets_return_to_the_pool() {
    init_tracing();
    let journal = Journal::default();
    let pool = Arc::new(PoolingTargetSource::new(user_class(), 1, move || {
        Ok(UserServiceImpl::new(journal.clone()) as Target)
    }));
    let proxy = ProxyFactory::with_target_source(pool.clone())
        .interface(USER_SERVICE)
        .get_handle()
        .unwrap();

    proxy.call(&save(), vec![Value::new(1)]).unwrap();
    assert!(proxy.call(&method("fail"), vec![Value::new(1)]).is_err());
    proxy.call(&load(), vec![Value::new(1)]).unwrap();

    assert_eq!(pool.acquired_count(), 3);
    assert_eq!(pool.released_count(), 3);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn returning_the_target_yields_the_proxy() {
    let journal = Journal::default();
    let factory = factory(&journal);
    factory.add_advice(Advice::before(before_fn(|_| Ok(())))).unwrap();
    let proxy = factory.get_handle().unwrap();

    let returned = proxy.call(&method("me"), Vec::new()).unwrap();
    let handle = returned.downcast_arc::<ProxyHandle>().unwrap();
    assert!(Arc::ptr_eq(&handle, &proxy));
}

#[test]
fn around_advice_can_retry_and_short_circuit() {
    init_tracing();
    let journal = Journal::default();
    let target = UserServiceImpl::flaky(journal.clone(), 2);
    let factory = ProxyFactory::new(target.clone(), user_class()).interface(USER_SERVICE);
    factory
        .add_advisor(
            Advisor::always(Advice::around(interceptor_fn("retry", |invocation| {
                if invocation.method().name() == "load" {
                    return Ok(Value::new(-1));
                }
                let mut attempts = 0;
                loop {
                    attempts += 1;
                    match invocation.proceed() {
                        Ok(value) => return Ok(value),
                        Err(e) if attempts >= 3 => return Err(e),
                        Err(_) => continue,
                    }
                }
            })))
            .with_order(1),
        )
        .unwrap();
    let attempt_journal = journal.clone();
    factory
        .add_advisor(
            Advisor::always(Advice::before(before_fn(move |_| {
                attempt_journal.push("attempt");
                Ok(())
            })))
            .with_order(2),
        )
        .unwrap();
    let proxy = factory.get_handle().unwrap();

    let value = proxy.call(&method("flaky"), Vec::new()).unwrap();
    assert_eq!(value.downcast_ref::<String>().unwrap(), "ok");
    assert_eq!(journal.entries().iter().filter(|e| *e == "attempt").count(), 3);
    assert_eq!(target.calls(), 3);

    let short = proxy.call(&load(), vec![Value::new(9)]).unwrap();
    assert_eq!(id(&short), -1);
    assert_eq!(target.calls(), 3);
}

#[test]
fn chains_are_cached_and_shared_across_threads() {
    init_tracing();
    let journal = Journal::default();
    let factory = factory(&journal);
    let counter = Arc::new(AtomicUsize::new(0));
    let before_counter = counter.clone();
    factory
        .add_advice(Advice::before(before_fn(move |_| {
            before_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })))
        .unwrap();
    let proxy = factory.get_handle().unwrap();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let proxy = &proxy;
            scope.spawn(move || {
                for i in 0..100 {
                    let method = if (worker + i) % 2 == 0 { save() } else { load() };
                    proxy.call(&method, vec![Value::new(i)]).unwrap();
                }
            });
        }
    });
    assert_eq!(counter.load(Ordering::SeqCst), 800);

    let advised = proxy.advised().unwrap();
    assert_eq!(advised.cached_chain_count(), 2);

    let late = Arc::new(AtomicUsize::new(0));
    let late_counter = late.clone();
    advised
        .add_advice(Advice::around(interceptor_fn("late", move |inv| {
            late_counter.fetch_add(1, Ordering::SeqCst);
            inv.proceed()
        })))
        .unwrap();
    assert_eq!(advised.cached_chain_count(), 0);
    proxy.call(&save(), vec![Value::new(1)]).unwrap();
    assert_eq!(late.load(Ordering::SeqCst), 1);
}

#[test]
fn introductions_expose_new_interfaces() {
    struct Lock {
        locks: AtomicUsize,
    }

    impl Invocable for Lock {
        fn invoke(self: Arc<Self>, method: &MethodSignature, _args: &[Value]) -> anyhow::Result<Value> {
            match method.name() {
                "lock" => {
                    self.locks.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::from_arc(self))
                }
                _ => Ok(Value::new(self.locks.load(Ordering::SeqCst))),
            }
        }
    }

    let journal = Journal::default();
    let lock = Arc::new(Lock {
        locks: AtomicUsize::new(0),
    });
    let introduction =
        IntroductionAdvisor::new(DelegatingIntroductionInterceptor::new(lock.clone(), ["Lockable"]), ["Lockable"])
            .unwrap();
    let factory = factory(&journal);
    factory.add_advisor(introduction.into()).unwrap();
    let proxy = factory.get_handle().unwrap();
    assert!(proxy.plan().interfaces().contains(&"Lockable".to_string()));

    let lock_method = MethodSignature::new("Lockable", "lock");
    let returned = proxy.call(&lock_method, Vec::new()).unwrap();
    assert!(Arc::ptr_eq(&returned.downcast_arc::<ProxyHandle>().unwrap(), &proxy));
    let count = proxy.call(&MethodSignature::new("Lockable", "locks"), Vec::new()).unwrap();
    assert_eq!(count.downcast_ref::<usize>(), Some(&1));

    proxy.call(&save(), vec![Value::new(1)]).unwrap();
    assert_eq!(journal.entries(), vec!["real:save"]);
}

#[test]
fn frozen_configuration_rejects_changes() {
    let journal = Journal::default();
    let proxy = factory(&journal)
        .config(ProxyConfig::new().frozen(true))
        .get_handle()
        .unwrap();
    let advised = proxy.advised().unwrap();
    let err = advised.add_advice(Advice::before(before_fn(|_| Ok(())))).unwrap_err();
    assert!(matches!(err, AopError::ConfigFrozen(_)));
}

#[test]
fn unknown_advice_shapes_are_rejected() {
    let registry = AdvisorAdapterRegistry::new();
    let err = registry
        .wrap(Advice::Custom(CustomAdvice::new("audit", 42u8)))
        .unwrap_err();
    assert!(matches!(err, AopError::UnknownAdviceType(_)));
}

#[test]
fn opaque_proxies_do_not_expose_configuration() {
    let journal = Journal::default();
    let proxy = factory(&journal)
        .config(ProxyConfig::new().opaque(true))
        .get_handle()
        .unwrap();
    assert!(proxy.advised().is_none());

    let err = proxy
        .call(&MethodSignature::new("Unrelated", "run"), Vec::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AopError>(),
        Some(AopError::MethodNotExposed { .. })
    ));
}

#[test]
fn after_finally_advice_observes_failures() {
    let journal = Journal::default();
    let factory = factory(&journal);
    let after_journal = journal.clone();
    let aspect = AspectDefinition::new("Cleanup").after(PointcutExpression::All, move |inv| {
        after_journal.push(format!("cleanup:{}", inv.method().name()));
        Ok(())
    });
    for advisor in aspect.advisors() {
        factory.add_advisor(advisor).unwrap();
    }
    let proxy = factory.get_handle().unwrap();
    assert!(proxy.call(&method("fail"), Vec::new()).is_err());
    assert_eq!(journal.entries(), vec!["real:fail", "cleanup:fail"]);
}

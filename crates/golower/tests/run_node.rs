//! Linked programs executed under node. Each test is skipped when node is
//! not installed.

use std::path::Path;
use std::process::Command;

use golower::{BuildOptions, BuildSession};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn have_node() -> bool {
    let found = Command::new("node")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success());
    if !found {
        eprintln!("node not found, skipping");
    }
    found
}

/// Exit code, stdout and stderr of a finished program.
struct Run {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

const TIME_PACKAGE: &str = r#"package time

type Duration int64

const Millisecond Duration = 1000000

func Sleep(d Duration)

func After(d Duration) <-chan bool {
	ch := make(chan bool, 1)
	go func() {
		Sleep(d)
		ch <- true
	}()
	return ch
}
"#;

const TIME_OVERLAY: &str = r#"package time

//golower:replace
//golower:blocking
func Sleep(d Duration)
"#;

const TIME_NATIVES: &str = r#"$natives["time"] = {
  Sleep: function* (d) {
    yield* $sleep(d / 1e6);
  },
};
"#;

/// Build `main_src` as the main package of a scratch module, link it and
/// run the result.
fn run(main_src: &str) -> Run {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(&root.join("go/src/time/time.go"), TIME_PACKAGE);
    write(&root.join("overlays/time/time.go"), TIME_OVERLAY);
    write(&root.join("overlays/time/time.inc.js"), TIME_NATIVES);
    let proj = root.join("proj");
    write(&proj.join("go.mod"), "module example.com/prog\n\ngo 1.21\n");
    write(&proj.join("main.go"), main_src);

    let options = BuildOptions {
        os: "js".into(),
        arch: "ecmascript".into(),
        tags: Vec::new(),
        goroot: root.join("go"),
        source_roots: Vec::new(),
        overlay_root: Some(root.join("overlays")),
        cache_dir: None,
        minify: false,
        tested_package: None,
    };
    let mut session = BuildSession::new(options);
    let entry = session.build_dir(&proj).unwrap();
    let script = root.join("prog.js");
    std::fs::write(&script, session.link(&entry).unwrap()).unwrap();

    let output = Command::new("node").arg(&script).output().unwrap();
    Run {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

#[test]
fn test_deferred_calls_run_last_in_first_out() {
    if !have_node() {
        return;
    }
    let out = run(
        "package main\n\nfunc main() {\n\tfor i := 0; i < 3; i++ {\n\t\tdefer println(\"deferred\", i)\n\t}\n\tprintln(\"body\")\n}\n",
    );
    assert_eq!(out.code, Some(0), "{}", out.stderr);
    assert_eq!(out.stderr, "body\ndeferred 2\ndeferred 1\ndeferred 0\n");
    assert_eq!(out.stdout, "");
}

#[test]
fn test_recover_in_a_helper_of_a_deferred_call_does_not_recover() {
    if !have_node() {
        return;
    }
    let out = run(
        r#"package main

func helper() interface{} {
	return recover()
}

func main() {
	defer func() {
		if helper() != nil {
			println("helper")
		}
		if recover() != nil {
			println("outer")
		}
	}()
	panic("boom")
}
"#,
    );
    assert_eq!(out.code, Some(0), "{}", out.stderr);
    assert_eq!(out.stderr, "outer\n");
}

#[test]
fn test_deferred_named_function_recovers() {
    if !have_node() {
        return;
    }
    let out = run(
        r#"package main

func catch() {
	if r := recover(); r != nil {
		println("caught")
	}
}

func f() (n int) {
	defer catch()
	n = 7
	panic("boom")
}

func main() {
	println(f())
}
"#,
    );
    assert_eq!(out.code, Some(0), "{}", out.stderr);
    assert_eq!(out.stderr, "caught\n7\n");
}

#[test]
fn test_other_goroutines_cannot_recover_a_parked_panic() {
    if !have_node() {
        return;
    }
    let out = run(
        r#"package main

func main() {
	gate := make(chan int)
	done := make(chan int)
	go func() {
		defer func() {
			<-gate
		}()
		panic("first")
	}()
	go func() {
		if recover() != nil {
			println("stolen")
		}
		gate <- 1
		done <- 1
	}()
	<-done
	println("main continued")
}
"#,
    );
    assert_eq!(out.code, Some(2), "{}", out.stderr);
    assert!(out.stderr.contains("panic: first"), "{}", out.stderr);
    assert!(!out.stderr.contains("stolen"), "{}", out.stderr);
}

#[test]
fn test_unbuffered_channel_delivers_every_value() {
    if !have_node() {
        return;
    }
    let out = run(
        r#"package main

func main() {
	ch := make(chan int)
	done := make(chan bool)
	go func() {
		sum := 0
		for v := range ch {
			sum += v
		}
		println("sum", sum)
		done <- true
	}()
	for i := 1; i <= 4; i++ {
		ch <- i
	}
	close(ch)
	<-done
}
"#,
    );
    assert_eq!(out.code, Some(0), "{}", out.stderr);
    assert_eq!(out.stderr, "sum 10\n");
}

#[test]
fn test_unbuffered_send_without_receiver_deadlocks() {
    if !have_node() {
        return;
    }
    let out = run("package main\n\nfunc main() {\n\tch := make(chan int)\n\tch <- 1\n\tprintln(\"unreachable\")\n}\n");
    assert_eq!(out.code, Some(2));
    assert!(
        out.stderr.contains("fatal error: all goroutines are asleep - deadlock!"),
        "{}",
        out.stderr
    );
    assert!(!out.stderr.contains("unreachable"));
}

#[test]
fn test_select_fires_once_and_withdraws_other_cases() {
    if !have_node() {
        return;
    }
    // A registration left behind on b would swallow the later send and
    // leave the final receive waiting forever.
    let out = run(
        r#"package main

func main() {
	a := make(chan int)
	b := make(chan int)
	go func() {
		a <- 1
	}()
	select {
	case v := <-a:
		println("a", v)
	case v := <-b:
		println("b", v)
	}
	go func() {
		b <- 2
	}()
	println("b", <-b)
}
"#,
    );
    assert_eq!(out.code, Some(0), "{}", out.stderr);
    assert_eq!(out.stderr, "a 1\nb 2\n");
}

#[test]
fn test_integer_divide_by_zero_panics() {
    if !have_node() {
        return;
    }
    let out = run(
        "package main\n\nfunc div(a, b int) int {\n\treturn a / b\n}\n\nfunc main() {\n\tprintln(div(1, 0))\n}\n",
    );
    assert_eq!(out.code, Some(2));
    assert!(
        out.stderr.starts_with("panic: runtime error: integer divide by zero\n"),
        "{}",
        out.stderr
    );
}

#[test]
fn test_native_sleep_suspends_the_goroutine() {
    if !have_node() {
        return;
    }
    let out = run(
        r#"package main

import "time"

func main() {
	ch := make(chan int)
	go func() {
		time.Sleep(5 * time.Millisecond)
		ch <- 1
	}()
	println("waiting")
	println("woke", <-ch)
}
"#,
    );
    assert_eq!(out.code, Some(0), "{}", out.stderr);
    assert_eq!(out.stderr, "waiting\nwoke 1\n");
}

#[test]
fn test_select_times_out_on_a_timer() {
    if !have_node() {
        return;
    }
    let out = run(
        r#"package main

import "time"

func main() {
	never := make(chan int)
	select {
	case <-never:
		println("never")
	case <-time.After(10 * time.Millisecond):
		println("timeout")
	}
}
"#,
    );
    assert_eq!(out.code, Some(0), "{}", out.stderr);
    assert_eq!(out.stderr, "timeout\n");
}

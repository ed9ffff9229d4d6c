/// OS 安装

pub mod direct;
pub mod kickstart;

use tokio::process::Command;

use common::{Error, Result};

/// 执行外部命令，合并 stdout/stderr；失败时输出带进错误
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::Internal(format!("执行 {program} 失败: {e}")))?;

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "{program} {} 退出码 {:?}:\n{combined}",
            args.join(" "),
            output.status.code()
        )));
    }
    Ok(combined)
}

/// 同上但容忍失败，返回是否成功
pub(crate) async fn run_tolerant(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

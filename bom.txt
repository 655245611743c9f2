@@ 2-2 REPLACE
new
@@ END
=== END FILE ===